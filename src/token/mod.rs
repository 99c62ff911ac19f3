//! Lexical tokens and the token stream the matcher operates on.
//!
//! A token stream is lossless: concatenating every token's text reproduces
//! the source exactly. Whitespace and comments are kept as trivia tokens so
//! a rewritten stream can be turned back into a file without a pretty-printer.

pub mod errors;
pub mod lexer;

pub use errors::LexError;
pub use lexer::{CLexer, Lexer};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Token classification produced by a [`Lexer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenKind {
    Whitespace,
    Comment,
    /// Identifiers and keywords (`if`, `return`, `$user`, `snake_case`).
    Ident,
    Number,
    /// Quoted literal, quotes included in the text.
    Str,
    /// Operators and punctuation, including brackets.
    Op,
}

impl TokenKind {
    /// Trivia never participates in matching.
    pub fn is_trivia(self) -> bool {
        matches!(self, TokenKind::Whitespace | TokenKind::Comment)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Whitespace => "whitespace",
            TokenKind::Comment => "comment",
            TokenKind::Ident => "ident",
            TokenKind::Number => "number",
            TokenKind::Str => "string",
            TokenKind::Op => "op",
        };
        f.write_str(name)
    }
}

/// Smallest lexical unit: kind, literal text and 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
        }
    }

    pub fn is_trivia(&self) -> bool {
        self.kind.is_trivia()
    }

    /// Opening bracket this token closes, if it is a closing bracket.
    pub fn closes(&self) -> Option<&'static str> {
        match self.text.as_str() {
            ")" if self.kind == TokenKind::Op => Some("("),
            "]" if self.kind == TokenKind::Op => Some("["),
            "}" if self.kind == TokenKind::Op => Some("{"),
            _ => None,
        }
    }

    pub fn opens(&self) -> bool {
        self.kind == TokenKind::Op && matches!(self.text.as_str(), "(" | "[" | "{")
    }
}

/// Render tokens back to source text.
pub fn tokens_to_text(tokens: &[Token]) -> String {
    let mut out = String::with_capacity(tokens.iter().map(|t| t.text.len()).sum());
    for token in tokens {
        out.push_str(&token.text);
    }
    out
}

/// Index of the first significant token at or after `from`.
pub fn next_significant(tokens: &[Token], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&i| !tokens[i].is_trivia())
}

/// Index of the last significant token strictly before `before`.
pub fn prev_significant(tokens: &[Token], before: usize) -> Option<usize> {
    (0..before.min(tokens.len())).rev().find(|&i| !tokens[i].is_trivia())
}

/// Byte range `[start, end)` covered by the inclusive token range.
pub fn byte_span(tokens: &[Token], start: usize, end: usize) -> (usize, usize) {
    let byte_start: usize = tokens[..start.min(tokens.len())]
        .iter()
        .map(|t| t.text.len())
        .sum();
    let byte_end = byte_start
        + tokens[start.min(tokens.len())..(end + 1).min(tokens.len())]
            .iter()
            .map(|t| t.text.len())
            .sum::<usize>();
    (byte_start, byte_end)
}

/// Recompute line numbers from token text, starting at line 1.
pub fn renumber_lines(tokens: &mut [Token]) {
    let mut line = 1;
    for token in tokens {
        token.line = line;
        line += token.text.matches('\n').count();
    }
}

/// Text of the inclusive token range, shortened to `limit` characters.
pub fn excerpt(tokens: &[Token], start: usize, end: usize, limit: usize) -> String {
    let end = (end + 1).min(tokens.len());
    let start = start.min(end);
    limit_chars(&tokens_to_text(&tokens[start..end]), limit)
}

/// Shorten text to `limit` characters, appending `...` when cut.
pub fn limit_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
