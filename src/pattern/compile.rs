//! Compilation of authored [`PatternDefinition`]s into matchable [`Pattern`]s.
//!
//! Templates are plain source text. A placeholder is `<name>` where `name`
//! is declared in `named_patterns`; in a search template `<name>?` marks it
//! optional. Everything between placeholders is tokenized with the run's
//! [`Lexer`]; search trivia is dropped, replace trivia is kept verbatim.

use crate::matcher::Match;
use crate::pattern::errors::PatternError;
use crate::pattern::schema::{
    CaptureRule, ContextPredicate, FilterRule, PatternDefinition, PostReplace,
};
use crate::token::{Lexer, Token, TokenKind};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Extra acceptance test run on every aligned candidate.
pub trait MatchPredicate: Send + Sync {
    fn accept(&self, candidate: &Match, tokens: &[Token]) -> bool;
}

impl<F> MatchPredicate for F
where
    F: Fn(&Match, &[Token]) -> bool + Send + Sync,
{
    fn accept(&self, candidate: &Match, tokens: &[Token]) -> bool {
        self(candidate, tokens)
    }
}

/// Hook that may adjust the captures of an accepted match.
pub trait MatchMutator: Send + Sync {
    fn mutate(&self, accepted: &mut Match, tokens: &[Token]);
}

impl<F> MatchMutator for F
where
    F: Fn(&mut Match, &[Token]) + Send + Sync,
{
    fn mutate(&self, accepted: &mut Match, tokens: &[Token]) {
        self(accepted, tokens)
    }
}

/// One element of a compiled search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSpec {
    /// A significant token matched by exact text.
    Literal(String),
    Capture {
        name: String,
        rule: CaptureRule,
        optional: bool,
        /// Text of the literal that follows, used to stop `balanced` captures.
        anchor: Option<String>,
    },
}

impl TokenSpec {
    pub fn is_optional(&self) -> bool {
        matches!(self, TokenSpec::Capture { optional: true, .. })
    }
}

/// Replacement template part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Tokens(Vec<Token>),
    Capture(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    pub parts: Vec<TemplatePart>,
}

#[derive(Debug, Clone)]
pub struct CaptureFilter {
    pub capture: String,
    pub rule: CompiledFilter,
}

#[derive(Debug, Clone)]
pub enum CompiledFilter {
    Regex(Regex),
    NotRegex(Regex),
    In(Vec<String>),
    NotIn(Vec<String>),
    Kind(TokenKind),
}

/// A compiled, immutable pattern ready for matching.
#[derive(Clone)]
pub struct Pattern {
    pub id: String,
    pub search: Vec<TokenSpec>,
    pub replace: Option<Template>,
    pub filters: Vec<CaptureFilter>,
    pub predicates: Vec<ContextPredicate>,
    pub post_replace: Vec<PostReplace>,
    pub cache_key: Option<String>,
    pub file_filter: Option<String>,
    pub directory_filter: Option<String>,
    pub avoid_syntax_errors: bool,
    pub avoid_result_in: Vec<Pattern>,
    custom_predicate: Option<Arc<dyn MatchPredicate>>,
    mutator: Option<Arc<dyn MatchMutator>>,
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern")
            .field("id", &self.id)
            .field("search", &self.search)
            .field("replace", &self.replace)
            .field("cache_key", &self.cache_key)
            .field("custom_predicate", &self.custom_predicate.is_some())
            .field("mutator", &self.mutator.is_some())
            .finish_non_exhaustive()
    }
}

impl Pattern {
    pub fn compile(def: &PatternDefinition, lexer: &dyn Lexer) -> Result<Self, PatternError> {
        let id = def.id.clone();

        for (name, rule) in &def.named_patterns {
            if let Some(message) = rule.problem() {
                return Err(PatternError::InvalidRule {
                    pattern: id,
                    name: name.clone(),
                    message: message.to_string(),
                });
            }
        }

        let search = compile_search(&id, &def.search, &def.named_patterns, lexer)?;
        let captured: Vec<&str> = search
            .iter()
            .filter_map(|spec| match spec {
                TokenSpec::Capture { name, .. } => Some(name.as_str()),
                TokenSpec::Literal(_) => None,
            })
            .collect();

        let replace = match &def.replace {
            Some(text) => Some(compile_template(&id, text, &captured, lexer)?),
            None => None,
        };

        let mut filters = Vec::with_capacity(def.filters.len());
        for filter in &def.filters {
            ensure_captured(&id, &filter.capture, &captured)?;
            filters.push(CaptureFilter {
                capture: filter.capture.clone(),
                rule: compile_filter(&id, &filter.capture, &filter.rule)?,
            });
        }

        for rule in &def.post_replace {
            ensure_captured(&id, &rule.capture, &captured)?;
        }

        if let Some(key) = &def.cache_key {
            if !is_valid_cache_key(key) {
                return Err(PatternError::InvalidCacheKey {
                    pattern: id,
                    key: key.clone(),
                });
            }
        }

        let mut avoid_result_in = Vec::with_capacity(def.avoid_result_in.len());
        for (idx, shape) in def.avoid_result_in.iter().enumerate() {
            let denied_id = format!("{id}#avoid_result_in[{idx}]");
            avoid_result_in.push(Pattern::search_only(
                denied_id,
                compile_search(&id, shape, &def.named_patterns, lexer)?,
            ));
        }

        Ok(Self {
            id,
            search,
            replace,
            filters,
            predicates: def.predicates.clone(),
            post_replace: def.post_replace.clone(),
            cache_key: def.cache_key.clone(),
            file_filter: def.file.clone(),
            directory_filter: def.directory.clone(),
            avoid_syntax_errors: def.avoid_syntax_errors,
            avoid_result_in,
            custom_predicate: None,
            mutator: None,
        })
    }

    fn search_only(id: String, search: Vec<TokenSpec>) -> Self {
        Self {
            id,
            search,
            replace: None,
            filters: Vec::new(),
            predicates: Vec::new(),
            post_replace: Vec::new(),
            cache_key: None,
            file_filter: None,
            directory_filter: None,
            avoid_syntax_errors: false,
            avoid_result_in: Vec::new(),
            custom_predicate: None,
            mutator: None,
        }
    }

    pub fn with_predicate(mut self, predicate: impl MatchPredicate + 'static) -> Self {
        self.custom_predicate = Some(Arc::new(predicate));
        self
    }

    pub fn with_mutator(mut self, mutator: impl MatchMutator + 'static) -> Self {
        self.mutator = Some(Arc::new(mutator));
        self
    }

    pub fn custom_predicate(&self) -> Option<&dyn MatchPredicate> {
        self.custom_predicate.as_deref()
    }

    pub fn mutator(&self) -> Option<&dyn MatchMutator> {
        self.mutator.as_deref()
    }

    pub fn is_detect_only(&self) -> bool {
        self.replace.is_none()
    }

    /// Number of non-optional search elements.
    pub fn min_match_length(&self) -> usize {
        self.search.iter().filter(|spec| !spec.is_optional()).count()
    }

    /// Whether the path-suffix and path-prefix filters admit `path`.
    pub fn admits_path(&self, path: &str) -> bool {
        self.file_filter
            .as_deref()
            .map_or(true, |suffix| path.ends_with(suffix))
            && self
                .directory_filter
                .as_deref()
                .map_or(true, |prefix| path.starts_with(prefix))
    }
}

enum Segment<'a> {
    Text(&'a str),
    Placeholder { name: &'a str, optional: bool },
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<([A-Za-z_][A-Za-z0-9_]*)>(\?)?").expect("placeholder regex is valid")
    })
}

fn split_template(text: &str, allow_optional: bool) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut last = 0;
    for caps in placeholder_regex().captures_iter(text) {
        let whole = caps.get(0).expect("group 0 always exists");
        let name = caps.get(1).expect("name group is mandatory").as_str();
        let optional = allow_optional && caps.get(2).is_some();
        // A `?` after a replace placeholder is ordinary text.
        let end = if caps.get(2).is_some() && !optional {
            whole.end() - 1
        } else {
            whole.end()
        };
        if whole.start() > last {
            segments.push(Segment::Text(&text[last..whole.start()]));
        }
        segments.push(Segment::Placeholder { name, optional });
        last = end;
    }
    if last < text.len() {
        segments.push(Segment::Text(&text[last..]));
    }
    segments
}

fn compile_search(
    id: &str,
    text: &str,
    named: &BTreeMap<String, CaptureRule>,
    lexer: &dyn Lexer,
) -> Result<Vec<TokenSpec>, PatternError> {
    let mut specs = Vec::new();
    let mut seen = HashSet::new();

    for segment in split_template(text, true) {
        match segment {
            Segment::Text(chunk) => {
                let tokens = lexer
                    .tokenize(chunk)
                    .map_err(|source| PatternError::Template {
                        pattern: id.to_string(),
                        template: "search",
                        source,
                    })?;
                specs.extend(
                    tokens
                        .into_iter()
                        .filter(|t| !t.is_trivia())
                        .map(|t| TokenSpec::Literal(t.text)),
                );
            }
            Segment::Placeholder { name, optional } => {
                let rule = named.get(name).cloned().ok_or_else(|| {
                    let known: Vec<&str> = named.keys().map(String::as_str).collect();
                    unknown_capture(id, name, &known)
                })?;
                if !seen.insert(name) {
                    return Err(PatternError::DuplicateCapture {
                        pattern: id.to_string(),
                        name: name.to_string(),
                    });
                }
                specs.push(TokenSpec::Capture {
                    name: name.to_string(),
                    rule,
                    optional,
                    anchor: None,
                });
            }
        }
    }

    if specs.is_empty() {
        return Err(PatternError::EmptySearch {
            pattern: id.to_string(),
        });
    }
    if specs.iter().all(TokenSpec::is_optional) {
        return Err(PatternError::NoRequiredSpec {
            pattern: id.to_string(),
        });
    }

    // Resolve the stop token of every balanced capture.
    for idx in 0..specs.len() {
        let next_literal = match specs.get(idx + 1) {
            Some(TokenSpec::Literal(text)) => Some(text.clone()),
            _ => None,
        };
        if let TokenSpec::Capture {
            name, rule, anchor, ..
        } = &mut specs[idx]
        {
            if *rule == CaptureRule::Balanced {
                match next_literal {
                    Some(text) => *anchor = Some(text),
                    None => {
                        return Err(PatternError::UnanchoredCapture {
                            pattern: id.to_string(),
                            name: name.clone(),
                        })
                    }
                }
            }
        }
    }

    Ok(specs)
}

fn compile_template(
    id: &str,
    text: &str,
    captured: &[&str],
    lexer: &dyn Lexer,
) -> Result<Template, PatternError> {
    let mut parts = Vec::new();
    for segment in split_template(text, false) {
        match segment {
            Segment::Text(chunk) => {
                let tokens = lexer
                    .tokenize(chunk)
                    .map_err(|source| PatternError::Template {
                        pattern: id.to_string(),
                        template: "replace",
                        source,
                    })?;
                parts.push(TemplatePart::Tokens(tokens));
            }
            Segment::Placeholder { name, .. } => {
                ensure_captured(id, name, captured)?;
                parts.push(TemplatePart::Capture(name.to_string()));
            }
        }
    }
    Ok(Template { parts })
}

fn compile_filter(id: &str, capture: &str, rule: &FilterRule) -> Result<CompiledFilter, PatternError> {
    let regex = |pattern: &str| {
        Regex::new(pattern).map_err(|e| PatternError::InvalidRegex {
            pattern: id.to_string(),
            capture: capture.to_string(),
            message: e.to_string(),
        })
    };
    Ok(match rule {
        FilterRule::Regex { pattern } => CompiledFilter::Regex(regex(pattern)?),
        FilterRule::NotRegex { pattern } => CompiledFilter::NotRegex(regex(pattern)?),
        FilterRule::In { values } => CompiledFilter::In(values.clone()),
        FilterRule::NotIn { values } => CompiledFilter::NotIn(values.clone()),
        FilterRule::Kind { token } => CompiledFilter::Kind(*token),
    })
}

fn ensure_captured(id: &str, name: &str, captured: &[&str]) -> Result<(), PatternError> {
    if captured.contains(&name) {
        Ok(())
    } else {
        Err(unknown_capture(id, name, captured))
    }
}

fn unknown_capture(id: &str, name: &str, known: &[&str]) -> PatternError {
    let suggestion = known
        .iter()
        .map(|candidate| (strsim::jaro_winkler(name, candidate), *candidate))
        .filter(|(score, _)| *score >= 0.8)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.to_string());
    PatternError::UnknownCapture {
        pattern: id.to_string(),
        name: name.to_string(),
        suggestion,
    }
}

fn is_valid_cache_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
