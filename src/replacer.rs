//! Replacement synthesis and guarded splicing.

use crate::matcher::{find_all, Match};
use crate::pattern::{Pattern, PostReplace, Template, TemplatePart, Transform};
use crate::token::{
    byte_span, next_significant, renumber_lines, tokens_to_text, LexError, Lexer, Token, TokenKind,
};
use heck::{ToKebabCase, ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use std::collections::HashMap;
use std::fmt;

/// Why a candidate replacement was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declined {
    /// The result (or a transformed capture) no longer lexes or checks cleanly.
    ReLex(LexError),
    /// The result contains a shape listed in `avoid_result_in`.
    DeniedResult { shape: String },
}

impl fmt::Display for Declined {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declined::ReLex(err) => write!(f, "replacement would not lex: {err}"),
            Declined::DeniedResult { shape } => {
                write!(f, "replacement produces denied shape '{shape}'")
            }
        }
    }
}

/// A replacement that passed every guard, not yet confirmed or written.
#[derive(Debug, Clone)]
#[must_use = "a Replacement does nothing until it is adopted"]
pub struct Replacement {
    /// Re-lexed stream of the whole file after the edit.
    pub tokens: Vec<Token>,
    /// Whole file text after the edit.
    pub text: String,
    /// 1-based line where the edit begins.
    pub line: usize,
    /// Matched source text.
    pub before: String,
    /// Text that replaces it.
    pub after: String,
}

#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    Applied(Replacement),
    Declined(Declined),
}

/// Builds replacement tokens from a template and splices them into a stream.
pub struct Replacer<'a> {
    lexer: &'a dyn Lexer,
}

impl<'a> Replacer<'a> {
    pub fn new(lexer: &'a dyn Lexer) -> Self {
        Self { lexer }
    }

    /// Expand `template` with `captures`, applying `post_replace` to capture text first.
    ///
    /// Transformed text is re-lexed. When it does not lex, `strict` turns that
    /// into an error; otherwise the text is kept as one token with the kind of
    /// the capture's first significant token.
    pub fn build(
        &self,
        template: &Template,
        captures: &HashMap<String, Vec<Token>>,
        post_replace: &[PostReplace],
        strict: bool,
    ) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();
        for part in &template.parts {
            match part {
                TemplatePart::Tokens(tokens) => out.extend(tokens.iter().cloned()),
                TemplatePart::Capture(name) => {
                    let captured = captures.get(name).map(Vec::as_slice).unwrap_or_default();
                    let mut rules = post_replace.iter().filter(|r| r.capture == *name).peekable();
                    if rules.peek().is_none() {
                        out.extend(captured.iter().cloned());
                        continue;
                    }
                    let text = rules.fold(tokens_to_text(captured), |text, rule| {
                        apply_transform(&rule.transform, &text)
                    });
                    match self.lexer.tokenize(&text) {
                        Ok(tokens) => out.extend(tokens),
                        Err(err) if strict => return Err(err),
                        Err(_) => {
                            let first = next_significant(captured, 0).map(|i| &captured[i]);
                            let kind = first.map_or(TokenKind::Op, |t| t.kind);
                            let line = first.map_or(1, |t| t.line);
                            out.push(Token::new(kind, text, line));
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    /// Splice the replacement for `found` into `tokens`, running the pattern's guards.
    ///
    /// Only errors the edit introduces count against `avoid_syntax_errors`:
    /// a file that already fails the structural check can still be edited.
    ///
    /// `avoid_result_in` shapes are searched in the whole new stream, but a
    /// hit declines the edit only when it overlaps the replaced byte range.
    /// For a deletion the hit must straddle the deletion point.
    pub fn apply(&self, pattern: &Pattern, template: &Template, found: &Match, tokens: &[Token]) -> ApplyOutcome {
        let built = match self.build(
            template,
            &found.captures,
            &pattern.post_replace,
            pattern.avoid_syntax_errors,
        ) {
            Ok(built) => built,
            Err(err) => return ApplyOutcome::Declined(Declined::ReLex(err)),
        };

        let end = found.end.min(tokens.len().saturating_sub(1));
        let mut spliced = Vec::with_capacity(tokens.len() + built.len());
        spliced.extend_from_slice(&tokens[..found.start]);
        spliced.extend(built.iter().cloned());
        spliced.extend_from_slice(&tokens[end + 1..]);
        let text = tokens_to_text(&spliced);

        let new_tokens = match self.lexer.tokenize(&text) {
            Ok(new_tokens) => new_tokens,
            Err(err) if pattern.avoid_syntax_errors => {
                return ApplyOutcome::Declined(Declined::ReLex(err))
            }
            Err(_) => {
                renumber_lines(&mut spliced);
                spliced
            }
        };

        if pattern.avoid_syntax_errors {
            if let Err(err) = self.lexer.check(&new_tokens) {
                if self.lexer.check(tokens).is_ok() {
                    return ApplyOutcome::Declined(Declined::ReLex(err));
                }
            }
        }

        let after = tokens_to_text(&built);
        let (edit_start, _) = byte_span(tokens, found.start, end);
        let edit_end = edit_start + after.len();
        for denied in &pattern.avoid_result_in {
            let hit = find_all(denied, &new_tokens).into_iter().any(|m| {
                let (s, e) = byte_span(&new_tokens, m.start, m.end);
                if edit_end == edit_start {
                    s < edit_start && e > edit_start
                } else {
                    s < edit_end && e > edit_start
                }
            });
            if hit {
                return ApplyOutcome::Declined(Declined::DeniedResult {
                    shape: denied.id.clone(),
                });
            }
        }

        ApplyOutcome::Applied(Replacement {
            tokens: new_tokens,
            text,
            line: found.line(tokens),
            before: found.text(tokens),
            after,
        })
    }
}

/// Apply one post-replace transform to capture text.
pub fn apply_transform(transform: &Transform, text: &str) -> String {
    match transform {
        Transform::Upper => text.to_uppercase(),
        Transform::Lower => text.to_lowercase(),
        Transform::Camel => keep_sigil(text, |s| s.to_lower_camel_case()),
        Transform::Snake => keep_sigil(text, |s| s.to_snake_case()),
        Transform::Studly => keep_sigil(text, |s| s.to_upper_camel_case()),
        Transform::Kebab => keep_sigil(text, |s| s.to_kebab_case()),
        Transform::Trim => text.trim().to_string(),
        Transform::TrimQuotes => trim_quotes(text).to_string(),
        Transform::Replace { from, to } => text.replace(from.as_str(), to),
    }
}

/// Case conversion drops punctuation, so a leading `$` is set aside first.
fn keep_sigil(text: &str, convert: impl Fn(&str) -> String) -> String {
    match text.strip_prefix('$') {
        Some(rest) => format!("${}", convert(rest)),
        None => convert(text),
    }
}

fn trim_quotes(text: &str) -> &str {
    for quote in ['"', '\'', '`'] {
        if let Some(inner) = text
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    text
}
