//! Event-property comparisons
//!
//! Compiles a scalar comparison on one property of a tracked event into a
//! predicate. Two modes exist:
//! - `Latest`: compare against the newest event of the key only. Used while
//!   an event is being ingested.
//! - `AnyEvent`: some historical event must match. Negative operators turn
//!   into "no event matches the positive form".

use super::EventPropertyKey;
use crate::error::{CoreError, Result};
use crate::predicate::{FilterOutcome, Predicate, SkipReason};
use crate::selector::FilterClause;
use crate::types::value::coerce_numeric_str;
use crate::types::Value;
use serde::{Deserialize, Serialize};

/// Comparison operator on an event property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not_contains")]
    NotContains,
}

impl CompareOp {
    pub fn parse(op: &str) -> Result<Self> {
        match op.trim() {
            "=" => Ok(CompareOp::Eq),
            "!=" => Ok(CompareOp::Ne),
            "<" => Ok(CompareOp::Lt),
            ">" => Ok(CompareOp::Gt),
            "contains" => Ok(CompareOp::Contains),
            "not_contains" => Ok(CompareOp::NotContains),
            other => Err(CoreError::UnknownOperator(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Contains => "contains",
            CompareOp::NotContains => "not_contains",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            CompareOp::Eq | CompareOp::Ne | CompareOp::Lt | CompareOp::Gt
        )
    }

    /// Positive counterpart of a negative operator
    pub fn positive(&self) -> Option<CompareOp> {
        match self {
            CompareOp::Ne => Some(CompareOp::Eq),
            CompareOp::NotContains => Some(CompareOp::Contains),
            _ => None,
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which events a comparison looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Newest event of the key only
    Latest,
    /// Any stored event of the key
    #[default]
    AnyEvent,
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareValue {
    Number(f64),
    Text(String),
}

impl CompareValue {
    /// Coerce a posted value for the operator.
    ///
    /// Numeric operators take the numeric prefix of the value (0 when none).
    pub fn for_op(op: CompareOp, value: &Value) -> Self {
        if op.is_numeric() {
            CompareValue::Number(value.coerce_f64().unwrap_or(0.0))
        } else {
            CompareValue::Text(value.to_text())
        }
    }
}

/// Comparison of one event property against a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPropertyCheck {
    pub event_key: String,
    pub prop_name: String,
    pub op: CompareOp,
    pub value: CompareValue,
    pub mode: ComparisonMode,
}

impl EventPropertyCheck {
    /// Test the property value of one event; `None` means the property is missing
    pub fn matches_value(&self, stored: Option<&serde_json::Value>) -> bool {
        let stored = match stored {
            Some(v) => v,
            None => return false,
        };

        match (&self.value, self.op) {
            (CompareValue::Number(expected), op) if op.is_numeric() => {
                let actual = match json_number(stored) {
                    Some(n) => n,
                    None => return false,
                };
                match op {
                    CompareOp::Eq => actual == *expected,
                    CompareOp::Ne => actual != *expected,
                    CompareOp::Lt => actual < *expected,
                    CompareOp::Gt => actual > *expected,
                    _ => false,
                }
            }
            (CompareValue::Text(needle), CompareOp::Contains) => {
                json_text(stored).is_some_and(|t| contains_ignore_ascii_case(&t, needle))
            }
            (CompareValue::Text(needle), CompareOp::NotContains) => {
                json_text(stored).is_some_and(|t| !contains_ignore_ascii_case(&t, needle))
            }
            _ => false,
        }
    }

    /// Test the raw stored value of one event
    pub fn matches_event_value(&self, raw: &str) -> bool {
        match super::decode_object(raw) {
            Some(map) => self.matches_value(map.get(&self.prop_name)),
            None => false,
        }
    }
}

/// Substring test with ASCII case folding, as `LIKE` behaves under the host collation
fn contains_ignore_ascii_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

/// Numeric view of a stored property
fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => Some(coerce_numeric_str(s)),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Text view of a stored property
fn json_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Compile a comparison on `event_key.prop_name`.
pub fn compile_comparison(
    event_key: &str,
    prop_name: &str,
    operator: &str,
    value: &Value,
    mode: ComparisonMode,
) -> Result<Predicate> {
    if event_key.is_empty() || prop_name.is_empty() {
        return Err(CoreError::InvalidPropertyKey(format!(
            "{}:{}",
            event_key, prop_name
        )));
    }

    let op = CompareOp::parse(operator)?;
    let check = |op: CompareOp| EventPropertyCheck {
        event_key: event_key.to_string(),
        prop_name: prop_name.to_string(),
        op,
        value: CompareValue::for_op(op, value),
        mode,
    };

    let predicate = match (mode, op.positive()) {
        (ComparisonMode::AnyEvent, Some(positive)) => {
            Predicate::EventProperty(check(positive)).negate()
        }
        _ => Predicate::EventProperty(check(op)),
    };
    Ok(predicate)
}

/// Compile an event filter clause posted by the host.
///
/// The property key comes from `extra_value`. A missing key, an empty
/// compare value or an unknown operator leaves the query unrestricted.
pub fn compile_event_clause(clause: &FilterClause, mode: ComparisonMode) -> FilterOutcome {
    if matches!(&clause.value, Value::String(s) if s.is_empty()) {
        return FilterOutcome::Skip(SkipReason::NoSelection);
    }

    let key = match clause.extra_value.as_deref().map(EventPropertyKey::parse) {
        Some(Ok(key)) => key,
        Some(Err(err)) => {
            log::debug!("Skipping event filter: {}", err);
            return FilterOutcome::Skip(SkipReason::NoSelection);
        }
        None => return FilterOutcome::Skip(SkipReason::NoSelection),
    };

    let operator = clause.operator.as_deref().unwrap_or_default();
    match compile_comparison(&key.event_key, &key.prop_name, operator, &clause.value, mode) {
        Ok(predicate) => FilterOutcome::Apply(predicate),
        Err(err) => {
            log::debug!("Skipping event filter on {}: {}", key.id(), err);
            FilterOutcome::Skip(SkipReason::NotApplicable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(op: CompareOp, value: Value) -> EventPropertyCheck {
        EventPropertyCheck {
            event_key: "purchase".into(),
            prop_name: "amount".into(),
            op,
            value: CompareValue::for_op(op, &value),
            mode: ComparisonMode::Latest,
        }
    }

    #[test]
    fn test_parse_operators() {
        assert_eq!(CompareOp::parse("=").unwrap(), CompareOp::Eq);
        assert_eq!(CompareOp::parse("not_contains").unwrap(), CompareOp::NotContains);
        assert!(matches!(
            CompareOp::parse(">="),
            Err(CoreError::UnknownOperator(_))
        ));
    }

    #[test]
    fn test_numeric_coercion() {
        let gt = check(CompareOp::Gt, Value::text("10"));
        assert!(gt.matches_value(Some(&json!(12))));
        assert!(gt.matches_value(Some(&json!("12.5"))));
        assert!(!gt.matches_value(Some(&json!(9))));

        let eq = check(CompareOp::Eq, Value::text("abc"));
        assert_eq!(eq.value, CompareValue::Number(0.0));
        assert!(eq.matches_value(Some(&json!("xyz"))));
    }

    #[test]
    fn test_missing_or_null_never_matches() {
        let ne = check(CompareOp::Ne, Value::Int(1));
        assert!(!ne.matches_value(None));
        assert!(!ne.matches_value(Some(&json!(null))));
        assert!(!ne.matches_value(Some(&json!({"nested": 1}))));
    }

    #[test]
    fn test_contains() {
        let contains = check(CompareOp::Contains, Value::text("50%"));
        assert!(contains.matches_value(Some(&json!("save 50% now"))));
        assert!(!contains.matches_value(Some(&json!("save 500 now"))));

        let not_contains = check(CompareOp::NotContains, Value::text("ios"));
        assert!(not_contains.matches_value(Some(&json!("android"))));
        assert!(!not_contains.matches_value(Some(&json!("IOS"))));
        assert!(!not_contains.matches_value(Some(&json!("ios 17"))));
    }

    #[test]
    fn test_matches_event_value() {
        let eq = check(CompareOp::Eq, Value::Int(20));
        assert!(eq.matches_event_value(r#"{"amount": 20}"#));
        assert!(!eq.matches_event_value(r#"{"other": 20}"#));
        assert!(!eq.matches_event_value("20"));
        assert!(!eq.matches_event_value("{broken"));
    }

    #[test]
    fn test_any_event_negatives_become_not_exists() {
        let predicate =
            compile_comparison("purchase", "amount", "!=", &Value::Int(5), ComparisonMode::AnyEvent)
                .unwrap();
        match predicate {
            Predicate::Not(inner) => match *inner {
                Predicate::EventProperty(check) => assert_eq!(check.op, CompareOp::Eq),
                other => panic!("Expected event property, got {:?}", other),
            },
            other => panic!("Expected negation, got {:?}", other),
        }
    }

    #[test]
    fn test_latest_keeps_negative_operator() {
        let predicate = compile_comparison(
            "purchase",
            "note",
            "not_contains",
            &Value::text("gift"),
            ComparisonMode::Latest,
        )
        .unwrap();
        match predicate {
            Predicate::EventProperty(check) => {
                assert_eq!(check.op, CompareOp::NotContains);
                assert_eq!(check.value, CompareValue::Text("gift".into()));
            }
            other => panic!("Expected event property, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_event_clause() {
        let clause = FilterClause::new("event_tracking_json_prop", ">", Value::text("3"))
            .with_extra_value("login:count:int");
        let outcome = compile_event_clause(&clause, ComparisonMode::AnyEvent);
        assert!(matches!(outcome, FilterOutcome::Apply(Predicate::EventProperty(_))));

        let missing_key = FilterClause::new("event_tracking_json_prop", ">", Value::text("3"));
        assert_eq!(
            compile_event_clause(&missing_key, ComparisonMode::AnyEvent),
            FilterOutcome::Skip(SkipReason::NoSelection)
        );

        let bad_op = FilterClause::new("event_tracking_json_prop", "between", Value::text("3"))
            .with_extra_value("login:count");
        assert_eq!(
            compile_event_clause(&bad_op, ComparisonMode::AnyEvent),
            FilterOutcome::Skip(SkipReason::NotApplicable)
        );

        let empty = FilterClause::new("event_tracking_json_prop", "=", Value::text(""))
            .with_extra_value("login:count");
        assert_eq!(
            compile_event_clause(&empty, ComparisonMode::AnyEvent),
            FilterOutcome::Skip(SkipReason::NoSelection)
        );
    }
}
