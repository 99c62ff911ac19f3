//! Drives one pattern over one file: skip cache, path filters, then the
//! scan / replace loop.
//!
//! The loop carries `(tokens, offset)`. After an applied edit the stream is
//! replaced wholesale by the re-lexed file and scanning resumes a little
//! before the end of the replacement, so a match that straddles the edited
//! boundary is still found. Positions for that resync are counted in
//! significant tokens of the old and re-lexed streams:
//!
//! ```text
//! resume = end + (new_count - old_count) + 1 - (min_len - 1)
//! ```
//!
//! never earlier than one token past the match start. When the replacement
//! left no token of its own (a deletion, or text the lexer merged into a
//! neighbour) the floor is the match start itself; the stream shrank, so
//! every edit still makes progress.

use crate::cache::SkipCache;
use crate::edit::{EditError, FileWriter};
use crate::matcher::{find_next, Match};
use crate::pattern::Pattern;
use crate::replacer::{ApplyOutcome, Replacer};
use crate::report::{Detection, Proposal, Rejection, Reporter};
use crate::source::SourceFile;
use crate::token::{LexError, Lexer, Token};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("failed to tokenize {path}: {source}")]
    Lex {
        path: PathBuf,
        #[source]
        source: LexError,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: EditError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Content recorded clean under the pattern's cache key.
    Cached,
    /// Excluded by the pattern's `file` / `directory` filter.
    Filtered,
}

/// Outcome of one pattern over one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub skipped: Option<SkipReason>,
    pub detected: usize,
    pub applied: usize,
    pub declined: usize,
    pub refused: usize,
    pub marked_clean: bool,
    /// Number of `find_next` calls made.
    pub matcher_calls: usize,
}

pub struct Rewriter<'a> {
    lexer: &'a dyn Lexer,
    reporter: &'a mut dyn Reporter,
    writer: &'a mut dyn FileWriter,
    cache: &'a mut SkipCache,
    detect_only: bool,
}

impl<'a> Rewriter<'a> {
    pub fn new(
        lexer: &'a dyn Lexer,
        reporter: &'a mut dyn Reporter,
        writer: &'a mut dyn FileWriter,
        cache: &'a mut SkipCache,
    ) -> Self {
        Self {
            lexer,
            reporter,
            writer,
            cache,
            detect_only: false,
        }
    }

    /// Treat every pattern as detect-only.
    pub fn detect_only(mut self, detect_only: bool) -> Self {
        self.detect_only = detect_only;
        self
    }

    pub fn cache(&mut self) -> &mut SkipCache {
        self.cache
    }

    /// Run `pattern` over `file`, writing confirmed edits and keeping
    /// `file.content` in step with what was written.
    pub fn run(&mut self, pattern: &Pattern, file: &mut SourceFile) -> Result<FileReport, RewriteError> {
        let mut report = FileReport::default();

        if let Some(key) = pattern.cache_key.as_deref() {
            if self.cache.is_clean_before(key, file) {
                debug!(pattern = %pattern.id, file = %file.path.display(), "skipped, clean in cache");
                report.skipped = Some(SkipReason::Cached);
                return Ok(report);
            }
        }

        if !pattern.admits_path(&file.filter_path()) {
            debug!(pattern = %pattern.id, file = %file.path.display(), "skipped by path filter");
            report.skipped = Some(SkipReason::Filtered);
            return Ok(report);
        }

        let mut tokens = file.tokens(self.lexer).map_err(|source| RewriteError::Lex {
            path: file.path.clone(),
            source,
        })?;
        let template = if self.detect_only {
            None
        } else {
            pattern.replace.as_ref()
        };
        let replacer = Replacer::new(self.lexer);
        let mut offset = 0;

        loop {
            report.matcher_calls += 1;
            let Some(found) = find_next(pattern, &tokens, offset) else {
                break;
            };
            report.detected += 1;
            let line = found.line(&tokens);
            debug!(pattern = %pattern.id, file = %file.path.display(), line, "match");

            let Some(template) = template else {
                let text = found.text(&tokens);
                self.reporter.detected(&Detection {
                    pattern: &pattern.id,
                    path: &file.path,
                    line,
                    text: &text,
                });
                offset = found.end + 1;
                continue;
            };

            let replacement = match replacer.apply(pattern, template, &found, &tokens) {
                ApplyOutcome::Applied(replacement) => replacement,
                ApplyOutcome::Declined(reason) => {
                    warn!(
                        pattern = %pattern.id,
                        file = %file.path.display(),
                        line,
                        reason = %reason,
                        "declined replacement"
                    );
                    self.reporter.declined(&Rejection {
                        pattern: &pattern.id,
                        path: &file.path,
                        line,
                        reason: &reason,
                    });
                    report.declined += 1;
                    offset = found.end + 1;
                    continue;
                }
            };

            let proposal = Proposal {
                pattern: &pattern.id,
                path: &file.path,
                line: replacement.line,
                before: &replacement.before,
                after: &replacement.after,
                old_content: &file.content,
                new_content: &replacement.text,
            };
            if !self.reporter.confirm(&proposal) {
                report.refused += 1;
                offset = found.end + 1;
                continue;
            }

            self.writer
                .write_file(&file.path, &file.content, &replacement.text)
                .map_err(|source| RewriteError::Write {
                    path: file.path.clone(),
                    source,
                })?;
            self.reporter.applied(&proposal);
            info!(
                pattern = %pattern.id,
                file = %file.path.display(),
                line = replacement.line,
                "applied replacement"
            );
            report.applied += 1;

            let resume = resume_ordinal(
                &found,
                &tokens,
                &replacement.tokens,
                pattern.min_match_length(),
            );
            tokens = replacement.tokens;
            file.content = replacement.text;
            offset = index_of_ordinal(&tokens, resume);
        }

        if report.detected == 0 {
            if let Some(key) = pattern.cache_key.as_deref() {
                self.cache.mark_clean(key, file);
                report.marked_clean = true;
            }
        }

        Ok(report)
    }
}

/// Ordinal (among significant tokens of `new_tokens`) where scanning
/// resumes after `found` in `old_tokens` was replaced.
fn resume_ordinal(found: &Match, old_tokens: &[Token], new_tokens: &[Token], min_len: usize) -> usize {
    let start = ordinal_of(old_tokens, found.start) as isize;
    let old_len = old_tokens[found.start..=found.end]
        .iter()
        .filter(|t| !t.is_trivia())
        .count() as isize;
    let delta = significant_count(new_tokens) as isize - significant_count(old_tokens) as isize;

    let end = start + old_len - 1;
    // Ordinal just past the replacement, then back up so a match may begin
    // in its last `min_len - 1` tokens.
    let resume = end + delta + 1 - (min_len as isize - 1);

    // Tokens the replacement occupies in the re-lexed stream.
    let footprint = old_len + delta;
    let floor = start + footprint.clamp(0, 1);
    resume.max(floor).max(0) as usize
}

fn significant_count(tokens: &[Token]) -> usize {
    tokens.iter().filter(|t| !t.is_trivia()).count()
}

/// Number of significant tokens before `index`.
fn ordinal_of(tokens: &[Token], index: usize) -> usize {
    tokens[..index.min(tokens.len())]
        .iter()
        .filter(|t| !t.is_trivia())
        .count()
}

/// Raw index of the `ordinal`-th significant token, or the stream length.
fn index_of_ordinal(tokens: &[Token], ordinal: usize) -> usize {
    tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.is_trivia())
        .nth(ordinal)
        .map_or(tokens.len(), |(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::edit::MemoryWriter;
    use crate::matcher::find_all;
    use crate::pattern::{CaptureRule, PatternDefinition};
    use crate::report::{Event, RecordingReporter};
    use crate::token::CLexer;

    fn compile(def: PatternDefinition) -> Pattern {
        Pattern::compile(&def, &CLexer::new()).unwrap()
    }

    struct Harness {
        lexer: CLexer,
        reporter: RecordingReporter,
        writer: MemoryWriter,
        cache: SkipCache,
    }

    impl Harness {
        fn new(reporter: RecordingReporter) -> Self {
            Self {
                lexer: CLexer::new(),
                reporter,
                writer: MemoryWriter::new(),
                cache: SkipCache::new(MemoryStore::new()),
            }
        }

        fn run(&mut self, pattern: &Pattern, file: &mut SourceFile, detect_only: bool) -> FileReport {
            let mut writer = self.writer.clone();
            Rewriter::new(&self.lexer, &mut self.reporter, &mut writer, &mut self.cache)
                .detect_only(detect_only)
                .run(pattern, file)
                .unwrap()
        }
    }

    #[test]
    fn boundary_match_inside_replacement_tail_is_found() {
        let pattern = compile(PatternDefinition::new("ab", "a b").replace("c a"));
        let mut h = Harness::new(RecordingReporter::accepting());
        let mut file = SourceFile::new("t.php", "a b b");

        let report = h.run(&pattern, &mut file, false);
        assert_eq!(file.content, "c c a");
        assert_eq!(report.applied, 2);
        assert_eq!(h.writer.writes().len(), 2);
    }

    #[test]
    fn two_occurrences_are_both_rewritten() {
        let pattern = compile(
            PatternDefinition::new("ternary", "if ( <cond> ) { return <val> ; }")
                .replace("return <cond> ? <val> : null;")
                .capture("cond", CaptureRule::Balanced)
                .capture("val", CaptureRule::Until { text: ";".to_string() }),
        );
        let mut h = Harness::new(RecordingReporter::accepting());
        let mut file = SourceFile::new(
            "t.php",
            "if (a) { return 1; }\nif (b) { return 2; }\n",
        );

        let report = h.run(&pattern, &mut file, false);
        assert_eq!(report.applied, 2);
        assert_eq!(
            file.content,
            "return a ? 1 : null;\nreturn b ? 2 : null;\n"
        );
    }

    #[test]
    fn deletion_resumes_at_match_start() {
        let pattern = compile(
            PatternDefinition {
                allow_empty_replace: true,
                ..PatternDefinition::new("drop", "x ;")
            }
            .replace(""),
        );
        let mut h = Harness::new(RecordingReporter::accepting());
        let mut file = SourceFile::new("t.php", "x;x;y;");

        let report = h.run(&pattern, &mut file, false);
        assert_eq!(file.content, "y;");
        assert_eq!(report.applied, 2);
    }

    #[test]
    fn refusal_keeps_stream_and_moves_on() {
        let pattern = compile(PatternDefinition::new("xy", "x").replace("y"));
        let mut h = Harness::new(RecordingReporter::refusing());
        let mut file = SourceFile::new("t.php", "x x");

        let report = h.run(&pattern, &mut file, false);
        assert_eq!(report.refused, 2);
        assert_eq!(report.applied, 0);
        assert_eq!(file.content, "x x");
        assert!(h.writer.writes().is_empty());
        assert!(!report.marked_clean);
    }

    #[test]
    fn detect_only_reports_without_writing() {
        let pattern = compile(PatternDefinition::new("xy", "x").replace("y").cache_key("xy"));
        let mut h = Harness::new(RecordingReporter::accepting());
        let mut file = SourceFile::new("t.php", "x;\nx;");

        let report = h.run(&pattern, &mut file, true);
        assert_eq!(report.detected, 2);
        assert_eq!(report.applied, 0);
        assert!(!report.marked_clean);
        assert!(h.writer.writes().is_empty());
        assert_eq!(
            h.reporter.events,
            vec![
                Event::Detected { pattern: "xy".into(), line: 1, text: "x".into() },
                Event::Detected { pattern: "xy".into(), line: 2, text: "x".into() },
            ]
        );
    }

    #[test]
    fn declined_edit_is_reported_and_skipped() {
        let pattern = compile(
            PatternDefinition::new("open", "f ( )")
                .replace("f (")
                .avoid_syntax_errors(),
        );
        let mut h = Harness::new(RecordingReporter::accepting());
        let mut file = SourceFile::new("t.php", "f(); f();");

        let report = h.run(&pattern, &mut file, false);
        assert_eq!(report.declined, 2);
        assert_eq!(file.content, "f(); f();");
        assert!(matches!(h.reporter.events[0], Event::Declined { line: 1, .. }));
    }

    #[test]
    fn clean_file_is_marked_and_then_skipped() {
        let pattern = compile(PatternDefinition::new("xy", "x").replace("y").cache_key("xy"));
        let mut h = Harness::new(RecordingReporter::accepting());
        let mut file = SourceFile::new("t.php", "z;");

        let first = h.run(&pattern, &mut file, false);
        assert!(first.marked_clean);
        assert_eq!(first.matcher_calls, 1);

        let second = h.run(&pattern, &mut file, false);
        assert_eq!(second.skipped, Some(SkipReason::Cached));
        assert_eq!(second.matcher_calls, 0);
    }

    #[test]
    fn path_filter_skips_file() {
        let mut def = PatternDefinition::new("xy", "x").replace("y");
        def.file = Some(".php".to_string());
        let pattern = compile(def);
        let mut h = Harness::new(RecordingReporter::accepting());
        let mut file = SourceFile::new("t.js", "x");

        let report = h.run(&pattern, &mut file, false);
        assert_eq!(report.skipped, Some(SkipReason::Filtered));
        assert_eq!(file.content, "x");
    }

    #[test]
    fn unlexable_file_is_an_error() {
        let pattern = compile(PatternDefinition::new("xy", "x").replace("y"));
        let lexer = CLexer::new();
        let mut reporter = RecordingReporter::accepting();
        let mut writer = MemoryWriter::new();
        let mut cache = SkipCache::disabled();
        let mut file = SourceFile::new("t.php", "x 'open");

        let result = Rewriter::new(&lexer, &mut reporter, &mut writer, &mut cache).run(&pattern, &mut file);
        assert!(matches!(result, Err(RewriteError::Lex { .. })));
    }

    #[test]
    fn resume_ordinal_follows_relexed_stream() {
        let lexer = CLexer::new();
        let old = lexer.tokenize("a b c").unwrap();
        let found = Match {
            start: 0,
            end: 4,
            captures: Default::default(),
        };
        // Shrinking a long match still advances past its start.
        assert_eq!(resume_ordinal(&found, &old, &lexer.tokenize("x").unwrap(), 3), 1);
        assert_eq!(resume_ordinal(&found, &old, &lexer.tokenize("").unwrap(), 3), 0);
        assert_eq!(resume_ordinal(&found, &old, &lexer.tokenize("x y z").unwrap(), 1), 3);

        // `a` -> `+` in "+a a" re-lexes as "++ a": one token fewer than built.
        let old = lexer.tokenize("+a a").unwrap();
        let found = Match {
            start: 1,
            end: 1,
            captures: Default::default(),
        };
        assert_eq!(resume_ordinal(&found, &old, &lexer.tokenize("++ a").unwrap(), 1), 1);
    }

    #[test]
    fn replacement_merged_by_relex_does_not_skip_next_match() {
        let pattern = compile(PatternDefinition::new("plus", "a").replace("+"));
        let mut h = Harness::new(RecordingReporter::accepting());
        let mut file = SourceFile::new("t.php", "+a a");

        let report = h.run(&pattern, &mut file, false);
        assert_eq!(file.content, "++ +");
        assert_eq!(report.applied, 2);
    }

    #[test]
    fn second_match_offset_reflects_token_delta() {
        use std::sync::{Arc, Mutex};

        let lexer = CLexer::new();
        let def = PatternDefinition::new("ternary", "if ( <cond> ) { return <val> ; }")
            .replace("return <cond> ? <val> : null;")
            .capture("cond", CaptureRule::Balanced)
            .capture("val", CaptureRule::Until { text: ";".to_string() });
        let original = "if (a) { return 1; }\nif (b) { return 2; }\n";
        let after_first = "return a ? 1 : null;\nif (b) { return 2; }\n";

        let original_tokens = lexer.tokenize(original).unwrap();
        let plain = compile(def.clone());
        let second_start = find_all(&plain, &original_tokens)[1].start;
        let delta = lexer.tokenize(after_first).unwrap().len() as isize
            - original_tokens.len() as isize;
        assert_ne!(delta, 0);

        let starts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&starts);
        let pattern = compile(def).with_predicate(move |m: &Match, _: &[Token]| {
            seen.lock().unwrap().push(m.start);
            true
        });
        let mut h = Harness::new(RecordingReporter::accepting());
        let mut file = SourceFile::new("t.php", original);

        let report = h.run(&pattern, &mut file, false);
        assert_eq!(report.applied, 2);
        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[1] as isize, second_start as isize + delta);
    }

    #[test]
    fn merging_replacement_shifts_second_match_by_relexed_delta() {
        use std::sync::{Arc, Mutex};

        let lexer = CLexer::new();
        let original = "x =a; y =a;";
        let after_first = "x ==; y =a;";
        let original_tokens = lexer.tokenize(original).unwrap();
        let plain = compile(PatternDefinition::new("eq", "a").replace("="));
        let second_start = find_all(&plain, &original_tokens)[1].start;
        // The built `=` fuses with its neighbour into `==` once re-lexed.
        let delta = lexer.tokenize(after_first).unwrap().len() as isize
            - original_tokens.len() as isize;
        assert_eq!(delta, -1);

        let starts = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&starts);
        let pattern = plain.with_predicate(move |m: &Match, _: &[Token]| {
            seen.lock().unwrap().push(m.start);
            true
        });
        let mut h = Harness::new(RecordingReporter::accepting());
        let mut file = SourceFile::new("t.php", original);

        let report = h.run(&pattern, &mut file, false);
        assert_eq!(report.applied, 2);
        assert_eq!(file.content, "x ==; y ==;");
        let starts = starts.lock().unwrap();
        assert_eq!(starts[1] as isize, second_start as isize + delta);
    }
}
