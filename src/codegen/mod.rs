mod codegen;

pub use codegen::ClassCompiler;
