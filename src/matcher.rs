//! Token-level pattern matching.
//!
//! The matcher slides a window over the significant tokens of a stream and
//! tries to align every [`TokenSpec`] of a pattern in order. Trivia between
//! elements is skipped. Alignment is greedy: optional elements take a token
//! when they can and never fail the candidate, captures take whatever their
//! [`CaptureRule`] consumes, and no alternative alignment is tried once one
//! succeeds or fails at a given start.
//!
//! # Capture consumption
//!
//! | rule | consumes |
//! |------|----------|
//! | `ident`, `string`, `number` | one token of that kind |
//! | `token` | any one significant token |
//! | `literal`, `one-of` | one token with matching text |
//! | `until` | one or more tokens up to the stop text at bracket depth 0 |
//! | `balanced` | as `until`, stopping at the next literal of the search |
//!
//! Multi-token captures never cross an unmatched closing bracket and fail if
//! the stop text is never reached.

use crate::pattern::{CaptureRule, CompiledFilter, ContextPredicate, Pattern, TokenSpec};
use crate::token::{next_significant, prev_significant, tokens_to_text, Token, TokenKind};
use std::collections::HashMap;

/// A successful alignment of a pattern against a token stream.
///
/// Offsets are inclusive indices into the stream the match was found in and
/// are meaningless once that stream is edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    /// Captured tokens per capture name; absent optional captures map to an empty list.
    pub captures: HashMap<String, Vec<Token>>,
}

impl Match {
    pub fn capture(&self, name: &str) -> Option<&[Token]> {
        self.captures.get(name).map(Vec::as_slice)
    }

    /// Source text of a capture, trivia inside it included.
    pub fn capture_text(&self, name: &str) -> Option<String> {
        self.capture(name).map(tokens_to_text)
    }

    /// Source text of the whole match.
    pub fn text(&self, tokens: &[Token]) -> String {
        tokens_to_text(&tokens[self.start..=self.end.min(tokens.len().saturating_sub(1))])
    }

    /// 1-based line of the first matched token.
    pub fn line(&self, tokens: &[Token]) -> usize {
        tokens.get(self.start).map_or(0, |t| t.line)
    }
}

/// Find the leftmost match of `pattern` starting at or after `start`.
pub fn find_next(pattern: &Pattern, tokens: &[Token], start: usize) -> Option<Match> {
    let mut offset = start;
    while let Some(candidate) = next_significant(tokens, offset) {
        if let Some(mut found) = align(pattern, tokens, candidate) {
            if accepts(pattern, &found, tokens) {
                if let Some(mutator) = pattern.mutator() {
                    mutator.mutate(&mut found, tokens);
                }
                return Some(found);
            }
        }
        offset = candidate + 1;
    }
    None
}

/// All non-overlapping matches, left to right.
pub fn find_all(pattern: &Pattern, tokens: &[Token]) -> Vec<Match> {
    let mut found = Vec::new();
    let mut offset = 0;
    while let Some(m) = find_next(pattern, tokens, offset) {
        offset = m.end + 1;
        found.push(m);
    }
    found
}

fn align(pattern: &Pattern, tokens: &[Token], at: usize) -> Option<Match> {
    let mut cursor = at;
    let mut end = None;
    let mut captures = HashMap::new();

    for spec in &pattern.search {
        let consumed = next_significant(tokens, cursor)
            .and_then(|here| consume(spec, tokens, here).map(|last| (here, last)));

        match (consumed, spec) {
            (Some((here, last)), _) => {
                if let TokenSpec::Capture { name, .. } = spec {
                    captures.insert(name.clone(), tokens[here..=last].to_vec());
                }
                end = Some(last);
                cursor = last + 1;
            }
            (None, TokenSpec::Capture { name, optional: true, .. }) => {
                captures.insert(name.clone(), Vec::new());
            }
            (None, _) => return None,
        }
    }

    Some(Match {
        start: at,
        end: end?,
        captures,
    })
}

/// Index of the last token `spec` consumes when starting at significant token `here`.
fn consume(spec: &TokenSpec, tokens: &[Token], here: usize) -> Option<usize> {
    let token = &tokens[here];
    match spec {
        TokenSpec::Literal(text) => (token.text == *text).then_some(here),
        TokenSpec::Capture { rule, anchor, .. } => match rule {
            CaptureRule::Ident => (token.kind == TokenKind::Ident).then_some(here),
            CaptureRule::Str => (token.kind == TokenKind::Str).then_some(here),
            CaptureRule::Number => (token.kind == TokenKind::Number).then_some(here),
            CaptureRule::Token => Some(here),
            CaptureRule::Literal { text } => (token.text == *text).then_some(here),
            CaptureRule::OneOf { texts } => texts.contains(&token.text).then_some(here),
            CaptureRule::Until { text } => consume_until(tokens, here, text),
            CaptureRule::Balanced => consume_until(tokens, here, anchor.as_deref()?),
        },
    }
}

fn consume_until(tokens: &[Token], here: usize, stop: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut last = None;
    for (idx, token) in tokens.iter().enumerate().skip(here) {
        if token.is_trivia() {
            continue;
        }
        if depth == 0 && token.text == stop {
            return last;
        }
        if token.opens() {
            depth += 1;
        } else if token.closes().is_some() {
            depth = depth.checked_sub(1)?;
        }
        last = Some(idx);
    }
    None
}

fn accepts(pattern: &Pattern, candidate: &Match, tokens: &[Token]) -> bool {
    pattern.filters.iter().all(|filter| {
        match candidate.capture(&filter.capture) {
            // Absent optional captures are not validated.
            Some([]) | None => true,
            Some(captured) => filter_accepts(&filter.rule, captured),
        }
    }) && pattern
        .predicates
        .iter()
        .all(|predicate| context_accepts(predicate, candidate, tokens))
        && pattern
            .custom_predicate()
            .map_or(true, |predicate| predicate.accept(candidate, tokens))
}

fn filter_accepts(rule: &CompiledFilter, captured: &[Token]) -> bool {
    let text = tokens_to_text(captured);
    match rule {
        CompiledFilter::Regex(re) => re.is_match(&text),
        CompiledFilter::NotRegex(re) => !re.is_match(&text),
        CompiledFilter::In(values) => values.iter().any(|v| *v == text),
        CompiledFilter::NotIn(values) => !values.iter().any(|v| *v == text),
        CompiledFilter::Kind(kind) => captured
            .iter()
            .filter(|t| !t.is_trivia())
            .all(|t| t.kind == *kind),
    }
}

fn context_accepts(predicate: &ContextPredicate, candidate: &Match, tokens: &[Token]) -> bool {
    let before = || prev_significant(tokens, candidate.start).map(|i| tokens[i].text.as_str());
    let after = || next_significant(tokens, candidate.end + 1).map(|i| tokens[i].text.as_str());
    match predicate {
        ContextPredicate::PrecededBy { text } => before() == Some(text.as_str()),
        ContextPredicate::NotPrecededBy { text } => before() != Some(text.as_str()),
        ContextPredicate::FollowedBy { text } => after() == Some(text.as_str()),
        ContextPredicate::NotFollowedBy { text } => after() != Some(text.as_str()),
    }
}
