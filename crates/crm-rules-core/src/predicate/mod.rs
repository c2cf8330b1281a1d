//! Predicate tree
//!
//! A query-language independent boolean expression over a contact's stored
//! facts. The compiler builds it; the runtime either executes it against a
//! data-access backend or renders it to SQL.

pub mod compiler;

pub use compiler::{FilterOutcome, PredicateCompiler, SkipReason};

use crate::event::EventPropertyCheck;
use crate::selector::RelationKind;
use crate::types::Value;
use serde::{Deserialize, Serialize};

/// Column of a related record a condition can test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordField {
    /// Product (download) id
    ProductId,
    /// Price / variant id, unset for simple products
    VariantId,
    /// Subscription status or review approval flag
    Status,
    /// Record type, e.g. the comment type of a review
    Kind,
}

/// Condition over a single related record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordCondition {
    /// Field equals the value
    Eq(RecordField, Value),
    /// Field is NULL or zero
    Unset(RecordField),
    /// Every condition holds
    All(Vec<RecordCondition>),
    /// At least one condition holds
    Any(Vec<RecordCondition>),
}

impl RecordCondition {
    pub fn eq(field: RecordField, value: impl Into<Value>) -> Self {
        RecordCondition::Eq(field, value.into())
    }

    /// Test the condition against one record
    pub fn matches<R: RecordView + ?Sized>(&self, record: &R) -> bool {
        match self {
            RecordCondition::Eq(field, expected) => {
                let actual = record.field(*field);
                !actual.is_blank() && actual.to_text() == expected.to_text()
            }
            RecordCondition::Unset(field) => {
                let actual = record.field(*field);
                actual.is_blank() || actual.coerce_f64() == Some(0.0)
            }
            RecordCondition::All(items) => items.iter().all(|c| c.matches(record)),
            RecordCondition::Any(items) => items.iter().any(|c| c.matches(record)),
        }
    }
}

/// Read access to the fields of a related record
pub trait RecordView {
    fn field(&self, field: RecordField) -> Value;
}

/// "At least one related record of this kind matches"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistenceCheck {
    pub relation: RelationKind,
    pub condition: RecordCondition,
}

/// Composable boolean expression over a contact's stored facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Some related record satisfies the condition
    Exists(ExistenceCheck),
    /// Comparison on a property of tracked events
    EventProperty(EventPropertyCheck),
    /// The contact has no link to the given external account provider
    NoLinkedAccount { provider: String },
    /// Negation
    Not(Box<Predicate>),
    /// Conjunction
    All(Vec<Predicate>),
    /// Disjunction
    Any(Vec<Predicate>),
}

impl Predicate {
    pub fn exists(relation: RelationKind, condition: RecordCondition) -> Self {
        Predicate::Exists(ExistenceCheck {
            relation,
            condition,
        })
    }

    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }

    pub fn no_linked_account(provider: impl Into<String>) -> Self {
        Predicate::NoLinkedAccount {
            provider: provider.into(),
        }
    }
}
