pub mod ast;
pub mod parser;

pub use ast::{
    Class, Expression, KeywordConst, Operator, Reference, Statement, SubCall, Subroutine,
    SubroutineCategory, Term, UnaryOp, VarKind, VarType, Variable, lift_class,
};
pub use parser::{ParseChild, ParseNode, ParseTag, Parser};
