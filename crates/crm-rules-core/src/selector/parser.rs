//! Option token parser
//!
//! Parses the multi-select tokens posted by filter and condition forms:
//! - `any`
//! - `42-all` (every variant of product 42)
//! - `42-0` (product 42 sold without variants)
//! - `42-7` (variant 7 of product 42)
//! - `42` (review selections only)
//!
//! Tokens that do not fit are dropped, never raised.

use super::types::{ParsedSelection, Selector};
use crate::selector::RelationKind;

/// Parse one subscription-style token
pub fn parse_token(token: &str) -> Option<Selector> {
    let token = token.trim();
    if token == "any" {
        return Some(Selector::Any);
    }

    let (id, variant) = token.split_once('-')?;
    let id = parse_unsigned(id)?;

    if variant == "all" {
        return (id > 0).then_some(Selector::EntireEntity(id));
    }

    match parse_unsigned(variant)? {
        0 => Some(Selector::SimpleEntity(id)),
        variant => Some(Selector::EntityVariant(id, variant)),
    }
}

/// Parse one review token: `any` or a product id.
///
/// A signed id is taken by absolute value; zero is dropped.
pub fn parse_review_token(token: &str) -> Option<Selector> {
    let token = token.trim();
    if token == "any" {
        return Some(Selector::Any);
    }

    let digits = token.strip_prefix(['-', '+']).unwrap_or(token);
    match parse_unsigned(digits)? {
        0 => None,
        id => Some(Selector::EntireEntity(id)),
    }
}

/// Non-negative integer made only of ASCII digits, at most `i64::MAX`
fn parse_unsigned(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<i64>().ok().map(|id| id as u64)
}

/// Parses token lists for one relation
#[derive(Debug, Clone, Copy)]
pub struct SelectionParser {
    relation: RelationKind,
}

impl SelectionParser {
    pub fn new(relation: RelationKind) -> Self {
        Self { relation }
    }

    pub fn relation(&self) -> RelationKind {
        self.relation
    }

    /// Parse a single token with the rules of this relation
    pub fn parse_one(&self, token: &str) -> Option<Selector> {
        match self.relation {
            RelationKind::LeftReview => parse_review_token(token),
            _ => parse_token(token),
        }
    }

    /// Parse a token list, keeping input order and recording discards
    pub fn parse<S: AsRef<str>>(&self, tokens: &[S]) -> ParsedSelection {
        let mut parsed = ParsedSelection::default();
        for token in tokens {
            let token = token.as_ref();
            match self.parse_one(token) {
                Some(selector) => parsed.selectors.push(selector),
                None => {
                    log::debug!(
                        "Discarding unusable {} selection token: {:?}",
                        self.relation,
                        token
                    );
                    parsed.discarded.push(token.to_string());
                }
            }
        }
        parsed
    }
}
