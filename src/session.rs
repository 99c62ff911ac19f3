//! Runs a set of patterns over a set of files and tallies the outcome.

use crate::rewrite::{Rewriter, SkipReason};
use crate::pattern::Pattern;
use crate::source::SourceFile;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Totals for one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub files: usize,
    /// (pattern, file) pairs skipped because the cache knew them clean.
    pub skipped_cached: usize,
    /// (pattern, file) pairs excluded by a path filter.
    pub skipped_filtered: usize,
    pub detected: usize,
    pub applied: usize,
    pub declined: usize,
    pub refused: usize,
    /// Applied edits per file.
    pub fixes: BTreeMap<PathBuf, usize>,
    pub errors: Vec<(PathBuf, String)>,
    /// Cache tables written by the final flush.
    pub cache_tables_written: usize,
}

impl RunSummary {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// A check run fails when it found anything; every run fails on errors.
    pub fn is_success(&self, check_mode: bool) -> bool {
        !self.has_errors() && !(check_mode && self.detected > 0)
    }
}

pub struct Session<'a> {
    rewriter: Rewriter<'a>,
    summary: RunSummary,
}

impl<'a> Session<'a> {
    pub fn new(rewriter: Rewriter<'a>) -> Self {
        Self {
            rewriter,
            summary: RunSummary::default(),
        }
    }

    /// Run every pattern over `path`. An error aborts this file only.
    pub fn process(&mut self, patterns: &[Pattern], path: &Path) {
        self.summary.files += 1;
        let mut file = match SourceFile::load(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to read file");
                self.summary.errors.push((path.to_path_buf(), e.to_string()));
                return;
            }
        };

        for pattern in patterns {
            match self.rewriter.run(pattern, &mut file) {
                Ok(report) => {
                    match report.skipped {
                        Some(SkipReason::Cached) => self.summary.skipped_cached += 1,
                        Some(SkipReason::Filtered) => self.summary.skipped_filtered += 1,
                        None => {}
                    }
                    self.summary.detected += report.detected;
                    self.summary.applied += report.applied;
                    self.summary.declined += report.declined;
                    self.summary.refused += report.refused;
                    if report.applied > 0 {
                        *self.summary.fixes.entry(path.to_path_buf()).or_default() +=
                            report.applied;
                    }
                }
                Err(e) => {
                    warn!(pattern = %pattern.id, file = %path.display(), error = %e, "aborting file");
                    self.summary.errors.push((path.to_path_buf(), e.to_string()));
                    return;
                }
            }
        }
    }

    pub fn run<P: AsRef<Path>>(mut self, patterns: &[Pattern], paths: &[P]) -> RunSummary {
        for path in paths {
            self.process(patterns, path.as_ref());
        }
        self.finish()
    }

    /// Flush the skip cache once and return the totals.
    pub fn finish(mut self) -> RunSummary {
        match self.rewriter.cache().flush() {
            Ok(written) => {
                debug!(tables = written, "skip cache flushed");
                self.summary.cache_tables_written = written;
            }
            Err(e) => {
                warn!(error = %e, "skip cache flush failed");
                self.summary
                    .errors
                    .push((PathBuf::from("<cache>"), e.to_string()));
            }
        }
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryStore, SkipCache};
    use crate::edit::AtomicWriter;
    use crate::pattern::PatternDefinition;
    use crate::report::RecordingReporter;
    use crate::token::CLexer;
    use std::fs;

    #[test]
    fn run_tallies_and_flushes_once() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.php");
        let b = dir.path().join("b.php");
        fs::write(&a, "x; x;").unwrap();
        fs::write(&b, "z;").unwrap();
        let missing = dir.path().join("missing.php");

        let lexer = CLexer::new();
        let pattern = Pattern::compile(
            &PatternDefinition::new("xy", "x").replace("y").cache_key("xy"),
            &lexer,
        )
        .unwrap();
        let store = MemoryStore::new();
        let mut cache = SkipCache::new(store.clone());
        let mut reporter = RecordingReporter::accepting();
        let mut writer = AtomicWriter::new();

        let rewriter = Rewriter::new(&lexer, &mut reporter, &mut writer, &mut cache);
        let summary = Session::new(rewriter).run(&[pattern], &[&a, &b, &missing]);

        assert_eq!(summary.files, 3);
        assert_eq!(summary.applied, 2);
        assert_eq!(summary.fixes.get(&a), Some(&2));
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.cache_tables_written, 1);
        assert_eq!(store.saves(), 1);
        assert_eq!(fs::read_to_string(&a).unwrap(), "y; y;");
        assert!(!summary.is_success(false));
    }

    #[test]
    fn check_mode_fails_on_detection() {
        let summary = RunSummary {
            detected: 1,
            ..RunSummary::default()
        };
        assert!(!summary.is_success(true));
        assert!(summary.is_success(false));
    }
}
