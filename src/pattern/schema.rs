use crate::token::TokenKind;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PatternConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub patterns: Vec<PatternDefinition>,
}

impl PatternConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.patterns.is_empty() {
            issues.push(ValidationIssue::EmptyPatternList);
        }

        let mut seen = HashSet::new();
        for pattern in &self.patterns {
            if pattern.id.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    pattern_id: None,
                    field: "id",
                });
            } else if !seen.insert(pattern.id.as_str()) {
                issues.push(ValidationIssue::DuplicateId {
                    pattern_id: pattern.id.clone(),
                });
            }
            if pattern.search.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    pattern_id: Some(pattern.id.clone()),
                    field: "search",
                });
            }
            if matches!(&pattern.replace, Some(text) if text.trim().is_empty())
                && !pattern.allow_empty_replace
            {
                issues.push(ValidationIssue::InvalidCombo {
                    pattern_id: Some(pattern.id.clone()),
                    message: "replace is blank; set allow_empty_replace = true to delete matches"
                        .to_string(),
                });
            }
            if pattern.replace.is_none()
                && (pattern.avoid_syntax_errors
                    || !pattern.avoid_result_in.is_empty()
                    || !pattern.post_replace.is_empty())
            {
                issues.push(ValidationIssue::InvalidCombo {
                    pattern_id: Some(pattern.id.clone()),
                    message: "avoid_syntax_errors, avoid_result_in and post_replace need a replace template"
                        .to_string(),
                });
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// One pattern as authored in a config file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PatternDefinition {
    pub id: String,
    /// Token template to look for; `<name>` is a capture, `<name>?` an optional one.
    pub search: String,
    /// Replacement template; absent means detect-only.
    #[serde(default)]
    pub replace: Option<String>,
    #[serde(default)]
    pub allow_empty_replace: bool,
    #[serde(default)]
    pub named_patterns: BTreeMap<String, CaptureRule>,
    #[serde(default)]
    pub filters: Vec<FilterDefinition>,
    #[serde(default)]
    pub predicates: Vec<ContextPredicate>,
    #[serde(default)]
    pub post_replace: Vec<PostReplace>,
    #[serde(default)]
    pub cache_key: Option<String>,
    /// Only files whose path ends with this.
    #[serde(default)]
    pub file: Option<String>,
    /// Only files whose path starts with this.
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub avoid_syntax_errors: bool,
    /// Search templates the result of a replacement must never contain.
    #[serde(default)]
    pub avoid_result_in: Vec<String>,
}

impl PatternDefinition {
    pub fn new(id: impl Into<String>, search: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            search: search.into(),
            ..Self::default()
        }
    }

    pub fn replace(mut self, template: impl Into<String>) -> Self {
        self.replace = Some(template.into());
        self
    }

    pub fn capture(mut self, name: impl Into<String>, rule: CaptureRule) -> Self {
        self.named_patterns.insert(name.into(), rule);
        self
    }

    pub fn filter(mut self, capture: impl Into<String>, rule: FilterRule) -> Self {
        self.filters.push(FilterDefinition {
            capture: capture.into(),
            rule,
        });
        self
    }

    pub fn predicate(mut self, predicate: ContextPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn post_replace(mut self, capture: impl Into<String>, transform: Transform) -> Self {
        self.post_replace.push(PostReplace {
            capture: capture.into(),
            transform,
        });
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn avoid_syntax_errors(mut self) -> Self {
        self.avoid_syntax_errors = true;
        self
    }

    pub fn avoid_result_in(mut self, search: impl Into<String>) -> Self {
        self.avoid_result_in.push(search.into());
        self
    }
}

/// How many tokens a capture consumes.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CaptureRule {
    /// One identifier or keyword.
    Ident,
    /// One quoted string literal.
    #[serde(rename = "string")]
    Str,
    /// One numeric literal.
    Number,
    /// Any single significant token.
    Token,
    /// One token with exactly this text.
    Literal { text: String },
    /// One token whose text is in the list.
    OneOf { texts: Vec<String> },
    /// One or more tokens up to the first `text` at bracket depth 0.
    Until { text: String },
    /// One or more bracket-balanced tokens up to the next literal of the search.
    Balanced,
}

impl CaptureRule {
    pub(crate) fn problem(&self) -> Option<&'static str> {
        match self {
            CaptureRule::Literal { text } | CaptureRule::Until { text } if text.trim().is_empty() => {
                Some("text must not be blank")
            }
            CaptureRule::OneOf { texts } if texts.is_empty() => Some("texts must not be empty"),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterDefinition {
    pub capture: String,
    #[serde(flatten)]
    pub rule: FilterRule,
}

/// Validator applied to the text of one capture.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum FilterRule {
    Regex { pattern: String },
    NotRegex { pattern: String },
    In { values: Vec<String> },
    NotIn { values: Vec<String> },
    /// Every significant token of the capture has this kind.
    Kind { token: TokenKind },
}

/// Condition on the significant tokens surrounding a match.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ContextPredicate {
    PrecededBy { text: String },
    NotPrecededBy { text: String },
    FollowedBy { text: String },
    NotFollowedBy { text: String },
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PostReplace {
    pub capture: String,
    #[serde(flatten)]
    pub transform: Transform,
}

/// Text transform applied to a capture before it is inserted.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "transform", rename_all = "kebab-case")]
pub enum Transform {
    Upper,
    Lower,
    /// `user_name` -> `userName`
    Camel,
    /// `userName` -> `user_name`
    Snake,
    /// `user_name` -> `UserName`
    Studly,
    /// `userName` -> `user-name`
    Kebab,
    Trim,
    /// Strip one pair of matching surrounding quotes.
    TrimQuotes,
    Replace { from: String, to: String },
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyPatternList,
    MissingField {
        pattern_id: Option<String>,
        field: &'static str,
    },
    DuplicateId {
        pattern_id: String,
    },
    InvalidCombo {
        pattern_id: Option<String>,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyPatternList => write!(f, "pattern config contains no patterns"),
            ValidationIssue::MissingField { pattern_id, field } => match pattern_id {
                Some(id) => write!(f, "pattern '{id}' missing required field '{field}'"),
                None => write!(f, "pattern missing required field '{field}'"),
            },
            ValidationIssue::DuplicateId { pattern_id } => {
                write!(f, "pattern id '{pattern_id}' is used more than once")
            }
            ValidationIssue::InvalidCombo {
                pattern_id,
                message,
            } => match pattern_id {
                Some(id) => write!(f, "pattern '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid pattern configuration: {message}"),
            },
        }
    }
}
