use thiserror::Error;

/// Every failure the pipeline can produce, tagged with the one-based source
/// line of the offending token (spec §7's error taxonomy).
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax error: {text}, line:{line}")]
    Lexical { text: String, line: usize },

    #[error("compile error, encountered:{encountered}, expected:{expected}, line:{line}")]
    Syntax {
        encountered: String,
        expected: String,
        line: usize,
    },

    #[error("{message}, line:{line}")]
    Semantic { message: String, line: usize },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    pub fn lexical(text: impl Into<String>, line: usize) -> Self {
        CompileError::Lexical {
            text: text.into(),
            line,
        }
    }

    pub fn syntax(encountered: impl Into<String>, expected: impl Into<String>, line: usize) -> Self {
        CompileError::Syntax {
            encountered: encountered.into(),
            expected: expected.into(),
            line,
        }
    }

    pub fn semantic(message: impl Into<String>, line: usize) -> Self {
        CompileError::Semantic {
            message: message.into(),
            line,
        }
    }

    /// The source line this error is tagged with, if any (I/O errors have none).
    pub fn line(&self) -> Option<usize> {
        match self {
            CompileError::Lexical { line, .. }
            | CompileError::Syntax { line, .. }
            | CompileError::Semantic { line, .. } => Some(*line),
            CompileError::Io(_) => None,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
