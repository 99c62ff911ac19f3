use std::path::{Path, PathBuf};
use thiserror::Error;

/// Boundary checks so rewrites only ever touch files under the scan root.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Canonical scan root
    workspace_root: PathBuf,
    /// Canonical directories that are never written, even under the root
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside workspace: {path} (workspace: {workspace})")]
    OutsideWorkspace { path: PathBuf, workspace: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl WorkspaceGuard {
    /// Guard `workspace_root`, forbidding its `.git` directory.
    pub fn new(workspace_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let workspace_root = workspace_root.as_ref().canonicalize()?;

        let mut forbidden_paths = Vec::new();
        if let Ok(git_dir) = workspace_root.join(".git").canonicalize() {
            forbidden_paths.push(git_dir);
        }

        Ok(Self {
            workspace_root,
            forbidden_paths,
        })
    }

    /// Also forbid `dir` (typically the skip cache directory). Directories
    /// that do not exist yet are recorded as given.
    pub fn forbid(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let canonical = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        self.forbidden_paths.push(canonical);
        self
    }

    /// Check if a path is safe to write, returning its canonical form.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };

        // Resolves symlinks and `..` before the boundary check
        let canonical = absolute.canonicalize()?;
        self.check_canonical(&canonical)?;

        Ok(canonical)
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.workspace_root) {
            return Err(SafetyError::OutsideWorkspace {
                path: canonical.to_path_buf(),
                workspace: self.workspace_root.clone(),
            });
        }

        for forbidden in &self.forbidden_paths {
            if canonical.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: canonical.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}
