mod lexer;

pub use lexer::{Lexer, Token, TokenType, KEYWORDS};
