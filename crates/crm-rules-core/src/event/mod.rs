//! Tracked-event JSON properties
//!
//! Tracked events carry a free-form value; when that value is a JSON object
//! each of its top-level members can be filtered on as
//! `event_key:prop_name[:prop_type]`.

pub mod comparison;

pub use comparison::{
    compile_comparison, compile_event_clause, CompareOp, CompareValue, ComparisonMode,
    EventPropertyCheck,
};

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

/// Advisory type of an event property, inferred from the latest observed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PropType {
    Int,
    Float,
    Bool,
    Null,
    #[default]
    String,
    Object,
}

impl PropType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropType::Int => "int",
            PropType::Float => "float",
            PropType::Bool => "bool",
            PropType::Null => "null",
            PropType::String => "string",
            PropType::Object => "object",
        }
    }

    /// Infer the type of a decoded property value.
    ///
    /// Numeric strings report as `float`, strings holding a JSON object and
    /// nested arrays or objects report as `object`.
    pub fn infer(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => PropType::Null,
            serde_json::Value::Bool(_) => PropType::Bool,
            serde_json::Value::Number(n) => {
                if n.is_i64() || n.is_u64() {
                    PropType::Int
                } else {
                    PropType::Float
                }
            }
            serde_json::Value::String(s) => {
                if is_numeric_str(s) {
                    PropType::Float
                } else if matches!(
                    serde_json::from_str::<serde_json::Value>(s),
                    Ok(serde_json::Value::Object(_))
                ) {
                    PropType::Object
                } else {
                    PropType::String
                }
            }
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => PropType::Object,
        }
    }
}

impl FromStr for PropType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "int" => Ok(PropType::Int),
            "float" => Ok(PropType::Float),
            "bool" => Ok(PropType::Bool),
            "null" => Ok(PropType::Null),
            "string" => Ok(PropType::String),
            "object" => Ok(PropType::Object),
            other => Err(CoreError::InvalidValue(format!("unknown prop type '{}'", other))),
        }
    }
}

impl std::fmt::Display for PropType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decimal number text, optionally signed, with optional exponent
fn is_numeric_str(s: &str) -> bool {
    let trimmed = s.trim_start();
    if trimmed.is_empty() || trimmed != trimmed.trim_end() {
        return false;
    }
    trimmed
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
        && trimmed.parse::<f64>().map(f64::is_finite).unwrap_or(false)
}

/// Compound key `event_key:prop_name[:prop_type]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventPropertyKey {
    pub event_key: String,
    pub prop_name: String,
    pub prop_type: PropType,
}

impl EventPropertyKey {
    pub fn new(event_key: impl Into<String>, prop_name: impl Into<String>) -> Self {
        Self {
            event_key: event_key.into(),
            prop_name: prop_name.into(),
            prop_type: PropType::default(),
        }
    }

    /// Parse a compound key. An unknown type falls back to `string`.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.splitn(3, ':');
        let event_key = parts.next().unwrap_or_default().trim();
        let prop_name = parts.next().unwrap_or_default().trim();

        if event_key.is_empty() || prop_name.is_empty() {
            return Err(CoreError::InvalidPropertyKey(raw.to_string()));
        }

        let prop_type = parts
            .next()
            .and_then(|t| t.trim().parse().ok())
            .unwrap_or_default();

        Ok(Self {
            event_key: event_key.to_string(),
            prop_name: prop_name.to_string(),
            prop_type,
        })
    }

    /// Option id without the type suffix
    pub fn id(&self) -> String {
        format!("{}:{}", self.event_key, self.prop_name)
    }
}

impl FromStr for EventPropertyKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// The newest row of one event key, as read for property discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSample {
    pub event_key: String,
    pub title: String,
    pub value: String,
}

/// One selectable event property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOption {
    pub id: String,
    pub title: String,
}

/// List the filterable properties found in event samples.
///
/// Only the first sample per event key is used and keys are visited in
/// descending order. Values that do not decode to a JSON object contribute
/// nothing.
pub fn discover_properties(samples: &[EventSample]) -> Vec<PropertyOption> {
    let mut seen_keys = HashSet::new();
    let mut latest: Vec<&EventSample> = samples
        .iter()
        .filter(|s| seen_keys.insert(s.event_key.as_str()))
        .collect();
    latest.sort_by(|a, b| b.event_key.cmp(&a.event_key));

    let mut seen_props = HashSet::new();
    let mut options = Vec::new();

    for sample in latest {
        let map = match decode_object(&sample.value) {
            Some(map) => map,
            None => continue,
        };
        for (prop_name, prop_value) in &map {
            let id = format!("{}:{}", sample.event_key, prop_name);
            if !seen_props.insert(id.clone()) {
                continue;
            }
            options.push(PropertyOption {
                title: format!(
                    "{}: {} ({})",
                    sample.title,
                    prop_name,
                    PropType::infer(prop_value)
                ),
                id,
            });
        }
    }

    log::debug!("Discovered {} event properties", options.len());
    options
}

/// Decode an event value into its top-level members, `None` unless it is a JSON object
pub fn decode_object(raw: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}
