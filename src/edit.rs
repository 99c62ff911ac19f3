use crate::safety::{SafetyError, WorkspaceGuard};
use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// What a writer expects to find on disk before replacing a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (cheaper to keep for large files)
    Hash(u64),
}

impl EditVerification {
    pub fn matches(&self, text: &str) -> bool {
        match self {
            EditVerification::ExactMatch(expected) => text == expected,
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Verification for `text`, hashed when over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(xxh3_64(text.as_bytes()))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("{file} changed on disk since it was read")]
    BeforeTextMismatch { file: PathBuf },

    #[error("Cannot write file: {0}")]
    Unsafe(#[from] SafetyError),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sink for rewritten file contents.
pub trait FileWriter {
    /// Replace `path`'s content with `after`, provided it still holds `before`.
    fn write_file(&mut self, path: &Path, before: &str, after: &str) -> Result<(), EditError>;
}

/// Writes through [`atomic_write`], optionally inside a [`WorkspaceGuard`].
#[derive(Debug, Default)]
pub struct AtomicWriter {
    guard: Option<WorkspaceGuard>,
}

impl AtomicWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guarded(guard: WorkspaceGuard) -> Self {
        Self { guard: Some(guard) }
    }
}

impl FileWriter for AtomicWriter {
    fn write_file(&mut self, path: &Path, before: &str, after: &str) -> Result<(), EditError> {
        let target = match &self.guard {
            Some(guard) => guard.validate_path(path)?,
            None => path.to_path_buf(),
        };

        let expected = EditVerification::from_text(before);
        let current = fs::read_to_string(&target)?;
        if !expected.matches(&current) {
            return Err(EditError::BeforeTextMismatch { file: target });
        }

        atomic_write(&target, after.as_bytes())?;

        // Touch mtime so watchers and incremental builds notice the change
        filetime::set_file_mtime(&target, filetime::FileTime::now())?;
        Ok(())
    }
}

/// Keeps writes in memory. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    writes: Rc<RefCell<Vec<(PathBuf, String)>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(PathBuf, String)> {
        self.writes.borrow().clone()
    }
}

impl FileWriter for MemoryWriter {
    fn write_file(&mut self, path: &Path, _before: &str, after: &str) -> Result<(), EditError> {
        self.writes
            .borrow_mut()
            .push((path.to_path_buf(), after.to_string()));
        Ok(())
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the file is left untouched.
pub fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    // Tempfile in the same directory keeps the rename on one filesystem
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Path has no parent directory",
            ))
        }
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
