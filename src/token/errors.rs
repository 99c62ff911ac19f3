use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("unterminated string literal starting on line {line}")]
    UnterminatedString { line: usize },

    #[error("unterminated block comment starting on line {line}")]
    UnterminatedComment { line: usize },

    #[error("unexpected '{found}' on line {line}")]
    UnexpectedCloser { found: String, line: usize },

    #[error("'{found}' on line {line} does not close '{open}' from line {open_line}")]
    MismatchedDelimiter {
        open: String,
        open_line: usize,
        found: String,
        line: usize,
    },

    #[error("'{open}' opened on line {line} is never closed")]
    UnclosedDelimiter { open: String, line: usize },
}
