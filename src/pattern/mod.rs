//! Declarative token patterns: authored definitions, their TOML loader and
//! the compiled form the matcher runs.

pub mod compile;
pub mod errors;
pub mod loader;
pub mod schema;

pub use compile::{
    CaptureFilter, CompiledFilter, MatchMutator, MatchPredicate, Pattern, Template, TemplatePart,
    TokenSpec,
};
pub use errors::PatternError;
pub use loader::{compile_all, load_from_path, load_from_str, CompiledSet, ConfigError};
pub use schema::{
    CaptureRule, ContextPredicate, FilterDefinition, FilterRule, Metadata, PatternConfig,
    PatternDefinition, PostReplace, Transform, ValidationError, ValidationIssue,
};
