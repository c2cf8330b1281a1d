//! Selection-to-predicate compiler
//!
//! Turns parsed selectors plus a filter operator into a [`Predicate`] for one
//! relation. The compiler is pure; empty selections come back as an explicit
//! [`FilterOutcome::Skip`] so callers leave their query unrestricted.

use super::{Predicate, RecordCondition, RecordField};
use crate::error::{CoreError, Result};
use crate::selector::{FilterOperator, RelationKind, SelectionParser, Selector, SelectorBuckets};
use serde::{Deserialize, Serialize};

/// Subscription status that counts as active
pub const ACTIVE_STATUS: &str = "active";
/// Approval flag of a published review comment
pub const APPROVED_STATUS: &str = "1";
/// Comment type used for product reviews
pub const REVIEW_KIND: &str = "edd_review";

/// Why a filter contributes nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Nothing was selected
    NoSelection,
    /// Every selected token was discarded
    NoUsableSelectors,
    /// The capability is switched off in configuration
    FeatureDisabled,
    /// The external plugin backing the relation is not present
    ProviderMissing,
    /// The clause is not for this handler
    NotApplicable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NoSelection => "no_selection",
            SkipReason::NoUsableSelectors => "no_usable_selectors",
            SkipReason::FeatureDisabled => "feature_disabled",
            SkipReason::ProviderMissing => "provider_missing",
            SkipReason::NotApplicable => "not_applicable",
        }
    }
}

/// Result of compiling one filter clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterOutcome {
    /// Restrict the query with this predicate
    Apply(Predicate),
    /// Leave the query unrestricted
    Skip(SkipReason),
}

impl FilterOutcome {
    pub fn predicate(&self) -> Option<&Predicate> {
        match self {
            FilterOutcome::Apply(p) => Some(p),
            FilterOutcome::Skip(_) => None,
        }
    }

    pub fn into_predicate(self) -> Option<Predicate> {
        match self {
            FilterOutcome::Apply(p) => Some(p),
            FilterOutcome::Skip(_) => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, FilterOutcome::Skip(_))
    }
}

/// Compiles selector sets into predicates
#[derive(Debug, Default, Clone, Copy)]
pub struct PredicateCompiler;

impl PredicateCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Parse raw tokens for the relation and compile them
    pub fn compile_tokens<S: AsRef<str>>(
        &self,
        tokens: &[S],
        operator: FilterOperator,
        relation: RelationKind,
    ) -> Result<FilterOutcome> {
        ensure_selector_relation(relation)?;
        if tokens.is_empty() {
            return Ok(FilterOutcome::Skip(SkipReason::NoSelection));
        }
        let parsed = SelectionParser::new(relation).parse(tokens);
        self.compile(&parsed.selectors, operator, relation)
    }

    /// Compile parsed selectors.
    ///
    /// `Any` subsumes every other selector. Without usable selectors the
    /// outcome is `Skip(NoUsableSelectors)`.
    pub fn compile(
        &self,
        selectors: &[Selector],
        operator: FilterOperator,
        relation: RelationKind,
    ) -> Result<FilterOutcome> {
        ensure_selector_relation(relation)?;

        let buckets = SelectorBuckets::from_selectors(selectors);
        let condition = match Self::record_condition(relation, &buckets) {
            Some(condition) => condition,
            None => return Ok(FilterOutcome::Skip(SkipReason::NoUsableSelectors)),
        };

        let positive = Predicate::exists(relation, condition);
        Ok(FilterOutcome::Apply(Self::apply_operator(
            positive, operator, relation,
        )))
    }

    /// Record-level condition a related record must satisfy to count as a match.
    ///
    /// `None` when the buckets hold nothing usable.
    pub fn record_condition(
        relation: RelationKind,
        buckets: &SelectorBuckets,
    ) -> Option<RecordCondition> {
        if buckets.any {
            return Some(Self::status_condition(relation));
        }
        if buckets.is_empty() {
            return None;
        }

        let mut alternatives = Vec::new();
        match relation {
            RelationKind::LeftReview => {
                // Reviews attach to the product only
                let mut ids: Vec<u64> = Vec::new();
                let all_ids = buckets
                    .entire
                    .iter()
                    .chain(buckets.simple.iter())
                    .chain(buckets.variants.iter().map(|(id, _)| id));
                for id in all_ids {
                    if !ids.contains(id) {
                        ids.push(*id);
                    }
                }
                alternatives.push(any_of(
                    ids.into_iter()
                        .map(|id| RecordCondition::eq(RecordField::ProductId, id))
                        .collect(),
                ));
            }
            _ => {
                if !buckets.entire.is_empty() {
                    alternatives.push(any_of(
                        buckets
                            .entire
                            .iter()
                            .map(|id| RecordCondition::eq(RecordField::ProductId, *id))
                            .collect(),
                    ));
                }
                if !buckets.simple.is_empty() {
                    alternatives.push(any_of(
                        buckets
                            .simple
                            .iter()
                            .map(|id| {
                                RecordCondition::All(vec![
                                    RecordCondition::eq(RecordField::ProductId, *id),
                                    RecordCondition::Unset(RecordField::VariantId),
                                ])
                            })
                            .collect(),
                    ));
                }
                if !buckets.variants.is_empty() {
                    alternatives.push(any_of(
                        buckets
                            .variants
                            .iter()
                            .map(|(id, variant)| {
                                RecordCondition::All(vec![
                                    RecordCondition::eq(RecordField::ProductId, *id),
                                    RecordCondition::eq(RecordField::VariantId, *variant),
                                ])
                            })
                            .collect(),
                    ));
                }
            }
        }

        Some(RecordCondition::All(vec![
            any_of(alternatives),
            Self::status_condition(relation),
        ]))
    }

    /// Status / approval condition of a counted record
    pub fn status_condition(relation: RelationKind) -> RecordCondition {
        match relation {
            RelationKind::LeftReview => RecordCondition::All(vec![
                RecordCondition::eq(RecordField::Status, APPROVED_STATUS),
                RecordCondition::eq(RecordField::Kind, REVIEW_KIND),
            ]),
            _ => RecordCondition::eq(RecordField::Status, ACTIVE_STATUS),
        }
    }

    /// Apply filter polarity.
    ///
    /// Excluding on an account-linked relation also admits contacts with no
    /// linked account, since they hold no matching record either.
    pub fn apply_operator(
        positive: Predicate,
        operator: FilterOperator,
        relation: RelationKind,
    ) -> Predicate {
        match operator {
            FilterOperator::Include => positive,
            FilterOperator::Exclude => match relation.link_provider() {
                Some(provider) => Predicate::Any(vec![
                    positive.negate(),
                    Predicate::no_linked_account(provider),
                ]),
                None => positive.negate(),
            },
        }
    }
}

fn any_of(mut items: Vec<RecordCondition>) -> RecordCondition {
    if items.len() == 1 {
        items.remove(0)
    } else {
        RecordCondition::Any(items)
    }
}

fn ensure_selector_relation(relation: RelationKind) -> Result<()> {
    if relation.uses_selectors() {
        Ok(())
    } else {
        Err(CoreError::UnsupportedRelation {
            relation: relation.to_string(),
            what: "selection tokens".to_string(),
        })
    }
}
