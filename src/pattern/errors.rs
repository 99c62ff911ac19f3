use crate::token::LexError;
use thiserror::Error;

/// Authoring errors found while compiling a pattern.
///
/// Each one is fatal for the pattern that produced it only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern '{pattern}': search is empty")]
    EmptySearch { pattern: String },

    #[error("pattern '{pattern}': every search element is optional, nothing anchors a match")]
    NoRequiredSpec { pattern: String },

    #[error("pattern '{pattern}': unknown capture '<{name}>'{}", suggestion_suffix(.suggestion))]
    UnknownCapture {
        pattern: String,
        name: String,
        suggestion: Option<String>,
    },

    #[error("pattern '{pattern}': capture '<{name}>' appears more than once in search")]
    DuplicateCapture { pattern: String, name: String },

    #[error("pattern '{pattern}': balanced capture '<{name}>' must be followed by a literal token")]
    UnanchoredCapture { pattern: String, name: String },

    #[error("pattern '{pattern}': named pattern '{name}' is invalid: {message}")]
    InvalidRule {
        pattern: String,
        name: String,
        message: String,
    },

    #[error("pattern '{pattern}': invalid regex filter on '<{capture}>': {message}")]
    InvalidRegex {
        pattern: String,
        capture: String,
        message: String,
    },

    #[error("pattern '{pattern}': cache key '{key}' may only contain letters, digits, '_', '-' and '.'")]
    InvalidCacheKey { pattern: String, key: String },

    #[error("pattern '{pattern}': cannot tokenize {template} template: {source}")]
    Template {
        pattern: String,
        template: &'static str,
        #[source]
        source: LexError,
    },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '<{name}>'?)"),
        None => String::new(),
    }
}
