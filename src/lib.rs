//! Token Refactor: declarative search and replace over token streams
//!
//! Sources are lexed into a lossless token stream. Patterns are written as
//! source text with `<name>` placeholders whose capture rules are declared
//! alongside, and matching walks the significant tokens while skipping
//! whitespace and comments.
//!
//! # Architecture
//!
//! - [`token`]: tokens and the [`Lexer`] trait with the default [`CLexer`]
//! - [`pattern`]: TOML pattern files, validation and compilation
//! - [`matcher`]: leftmost, greedy matching of a compiled [`Pattern`]
//! - [`replacer`]: replacement synthesis with syntax and denylist guards
//! - [`rewrite`]: the per-file scan / confirm / write loop
//! - [`cache`]: the skip cache of content known to have no match
//! - [`session`]: a run over many files with one cache flush at the end
//!
//! # Safety
//!
//! - Edits re-lex the whole file; guarded patterns decline edits that break it
//! - Atomic file writes (tempfile + fsync + rename)
//! - Writes verify the file still holds what was read
//! - Workspace boundary enforcement
//!
//! # Example
//!
//! ```no_run
//! use token_refactor::{
//!     CLexer, MemoryWriter, Pattern, PatternDefinition, RecordingReporter, Rewriter,
//!     SkipCache, SourceFile,
//! };
//!
//! let lexer = CLexer::new();
//! let pattern = Pattern::compile(
//!     &PatternDefinition::new("strict", "<a> == <b>").replace("<a> === <b>")
//!         .capture("a", token_refactor::CaptureRule::Ident)
//!         .capture("b", token_refactor::CaptureRule::Token),
//!     &lexer,
//! )?;
//!
//! let mut file = SourceFile::new("index.php", "if ($a == 1) {}");
//! let mut reporter = RecordingReporter::accepting();
//! let mut writer = MemoryWriter::new();
//! let mut cache = SkipCache::disabled();
//! Rewriter::new(&lexer, &mut reporter, &mut writer, &mut cache).run(&pattern, &mut file)?;
//! assert_eq!(file.content, "if ($a === 1) {}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod cache;
pub mod edit;
pub mod matcher;
pub mod pattern;
pub mod replacer;
pub mod report;
pub mod rewrite;
pub mod safety;
pub mod session;
pub mod source;
pub mod token;

// Re-exports
pub use cache::{CacheError, CacheStore, CacheTable, JsonDirStore, MemoryStore, SkipCache};
pub use edit::{atomic_write, AtomicWriter, EditError, FileWriter, MemoryWriter};
pub use matcher::{find_all, find_next, Match};
pub use pattern::{
    compile_all, load_from_path, load_from_str, CaptureRule, CompiledSet, ConfigError,
    ContextPredicate, FilterRule, MatchMutator, MatchPredicate, Pattern, PatternConfig,
    PatternDefinition, PatternError, Transform,
};
pub use replacer::{apply_transform, ApplyOutcome, Declined, Replacement, Replacer};
pub use report::{
    prompt_yes_no, ConsoleReporter, Detection, Event, Proposal, RecordingReporter, Rejection, Reporter,
};
pub use rewrite::{FileReport, RewriteError, Rewriter, SkipReason};
pub use safety::{SafetyError, WorkspaceGuard};
pub use session::{RunSummary, Session};
pub use source::SourceFile;
pub use token::{CLexer, LexError, Lexer, Token, TokenKind};
