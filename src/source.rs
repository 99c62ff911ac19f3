use crate::token::{LexError, Lexer, Token};
use std::fs;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

/// A source file's path and current content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Read `path` as UTF-8.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Ok(Self::new(path, content))
    }

    /// xxh3 of the content as 16 lowercase hex digits.
    pub fn content_hash(&self) -> String {
        format!("{:016x}", xxh3_64(self.content.as_bytes()))
    }

    /// Identity recorded next to the hash in the skip cache.
    pub fn identity(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Path as matched by pattern `file` / `directory` filters.
    pub fn filter_path(&self) -> String {
        self.identity().replace('\\', "/")
    }

    pub fn tokens(&self, lexer: &dyn Lexer) -> Result<Vec<Token>, LexError> {
        lexer.tokenize(&self.content)
    }
}
