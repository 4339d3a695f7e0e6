use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::fmt;
use std::io::BufRead;

use crate::error::CompileError;

/// Five lexical categories, per spec §3. Keywords and symbols are drawn from
/// fixed, closed sets; identifiers/integers/strings carry their own text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenType {
    Keyword,
    Identifier,
    Symbol,
    IntegerConstant,
    StringConstant,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub token_type: TokenType,
    /// Literal text: keyword/identifier/symbol spelling, digits of an
    /// integer constant, or the interior text of a string constant (no
    /// surrounding quotes).
    pub text: String,
    pub line: usize,
}

impl Token {
    pub fn new(token_type: TokenType, text: impl Into<String>, line: usize) -> Self {
        Self {
            token_type,
            text: text.into(),
            line,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

pub static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "class",
        "constructor",
        "function",
        "method",
        "field",
        "static",
        "var",
        "int",
        "char",
        "boolean",
        "void",
        "true",
        "false",
        "null",
        "this",
        "let",
        "do",
        "if",
        "else",
        "while",
        "return",
    ]
    .into_iter()
    .collect()
});

const SYMBOLS: &str = "{}()[].,;+-*/&|<>=~";

const MAX_INTEGER_CONSTANT: i64 = 32767;

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_word_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Turns source text into a flat stream of classified tokens, stripping
/// comments and whitespace as it goes (spec §4.1).
///
/// Block-comment state carries across lines, so a `/*` opened on one line
/// and closed on a later one is recognized as a single comment run.
pub struct Lexer {
    tokens: Vec<Token>,
    buffer: String,
    line: usize,
    in_block_comment: bool,
}

impl Lexer {
    pub fn new() -> Self {
        Self {
            tokens: Vec::new(),
            buffer: String::new(),
            line: 0,
            in_block_comment: false,
        }
    }

    /// Lexes every line read from `reader`, returning the full token stream.
    pub fn lex<R: BufRead>(mut reader: R) -> Result<Vec<Token>, CompileError> {
        let mut lexer = Lexer::new();
        let mut raw = String::new();
        loop {
            raw.clear();
            let bytes_read = reader.read_line(&mut raw)?;
            if bytes_read == 0 {
                break;
            }
            lexer.line += 1;
            let line = raw.trim_end_matches(['\n', '\r']).to_string();
            lexer.lex_line(&line)?;
        }
        lexer.flush()?;
        Ok(lexer.tokens)
    }

    fn lex_line(&mut self, raw_line: &str) -> Result<(), CompileError> {
        let stripped = self.strip_comments(raw_line);
        if stripped.trim().is_empty() {
            return Ok(());
        }
        self.scan(&stripped)
    }

    /// Removes `//` line comments and `/* ... */` block comments, which may
    /// open, close, or span this single line.
    fn strip_comments(&mut self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if self.in_block_comment {
                if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                    self.in_block_comment = false;
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }
            if chars[i] == '/' && chars.get(i + 1) == Some(&'/') {
                break;
            }
            if chars[i] == '/' && chars.get(i + 1) == Some(&'*') {
                self.in_block_comment = true;
                i += 2;
                continue;
            }
            out.push(chars[i]);
            i += 1;
        }
        out
    }

    fn scan(&mut self, line: &str) -> Result<(), CompileError> {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] == '"' {
                self.flush()?;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != '"' {
                    j += 1;
                }
                if j >= chars.len() {
                    let text: String = chars[start..j].iter().collect();
                    return Err(CompileError::lexical(format!("\"{}", text), self.line));
                }
                let text: String = chars[start..j].iter().collect();
                self.tokens
                    .push(Token::new(TokenType::StringConstant, text, self.line));
                i = j + 1;
                continue;
            }
            self.scan_char(chars[i])?;
            i += 1;
        }
        self.flush()
    }

    fn scan_char(&mut self, c: char) -> Result<(), CompileError> {
        if is_word_continue(c) {
            self.buffer.push(c);
            return Ok(());
        }
        self.flush()?;
        if SYMBOLS.contains(c) {
            self.tokens
                .push(Token::new(TokenType::Symbol, c.to_string(), self.line));
            Ok(())
        } else if c == ' ' || c == '\t' {
            Ok(())
        } else {
            Err(CompileError::lexical(c.to_string(), self.line))
        }
    }

    /// Flushes the in-progress word/digit run, classifying it as a keyword,
    /// identifier, or integer constant.
    fn flush(&mut self) -> Result<(), CompileError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.buffer);
        let first = text.chars().next().unwrap();
        if first.is_ascii_digit() {
            let value: i64 = text
                .parse()
                .map_err(|_| CompileError::lexical(text.clone(), self.line))?;
            if value > MAX_INTEGER_CONSTANT {
                return Err(CompileError::lexical(text, self.line));
            }
            self.tokens
                .push(Token::new(TokenType::IntegerConstant, text, self.line));
        } else if is_word_start(first) {
            let token_type = if KEYWORDS.contains(text.as_str()) {
                TokenType::Keyword
            } else {
                TokenType::Identifier
            };
            self.tokens.push(Token::new(token_type, text, self.line));
        } else {
            return Err(CompileError::lexical(text, self.line));
        }
        Ok(())
    }
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::lex(Cursor::new(src)).expect("lex should succeed")
    }

    #[test]
    fn lexes_keywords_identifiers_and_symbols() {
        let tokens = lex("class Foo {");
        assert_eq!(tokens[0], Token::new(TokenType::Keyword, "class", 1));
        assert_eq!(tokens[1], Token::new(TokenType::Identifier, "Foo", 1));
        assert_eq!(tokens[2], Token::new(TokenType::Symbol, "{", 1));
    }

    #[test]
    fn integer_constant_at_boundary() {
        let tokens = lex("32767");
        assert_eq!(tokens[0].token_type, TokenType::IntegerConstant);
        assert_eq!(tokens[0].text, "32767");
    }

    #[test]
    fn integer_constant_out_of_range_is_lexical_error() {
        let err = Lexer::lex(Cursor::new("32768")).unwrap_err();
        assert!(matches!(err, CompileError::Lexical { .. }));
    }

    #[test]
    fn string_constant_carries_interior_text_only() {
        let tokens = lex("\"hello world\"");
        assert_eq!(tokens[0].token_type, TokenType::StringConstant);
        assert_eq!(tokens[0].text, "hello world");
    }

    #[test]
    fn unterminated_string_is_lexical_error() {
        let err = Lexer::lex(Cursor::new("\"oops")).unwrap_err();
        assert!(matches!(err, CompileError::Lexical { .. }));
    }

    #[test]
    fn line_comment_to_end_of_line_is_stripped() {
        let tokens = lex("let x = 1; // comment here");
        assert_eq!(tokens.last().unwrap().text, ";");
    }

    #[test]
    fn block_comment_spanning_multiple_lines_is_stripped() {
        let tokens = lex("let x /* this\nspans\nlines */ = 1;");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["let", "x", "=", "1", ";"]);
    }

    #[test]
    fn line_number_tracks_empty_lines() {
        let tokens = lex("let x = 1;\n\n\nlet y = 2;");
        let y_tok = tokens.iter().find(|t| t.text == "y").unwrap();
        assert_eq!(y_tok.line, 4);
    }

    #[test]
    fn unrecognized_character_is_lexical_error() {
        let err = Lexer::lex(Cursor::new("let x = 1 @ 2;")).unwrap_err();
        assert!(matches!(err, CompileError::Lexical { .. }));
    }
}
