mod symbols;

pub use symbols::{ResolvedVar, Segment, SymbolTable};
