//! Update contact property action
//!
//! Sets main contact fields and custom fields from key/value pairs. Custom
//! fields of type `number`, `checkbox` and `select-multi` additionally accept
//! an `add` / `subtract` operation against the stored value.

use super::ActionOutcome;
use crate::error::{Result, RuntimeError};
use crate::storage::{ContactStore, CustomFieldDefinition};
use crm_rules_core::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

pub const ACTION_NAME: &str = "update_contact_property";

/// One configured property assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAssignment {
    pub data_key: String,
    #[serde(default)]
    pub data_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_operation: Option<String>,
}

impl PropertyAssignment {
    pub fn set(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            data_key: key.into(),
            data_value: value.into(),
            data_operation: None,
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.data_operation = Some(operation.into());
        self
    }

    fn operation(&self) -> Option<FieldOperation> {
        self.data_operation
            .as_deref()
            .filter(|op| !op.is_empty())
            .map(FieldOperation::from_host)
    }
}

/// Operation against the stored value of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOperation {
    Add,
    Subtract,
}

impl FieldOperation {
    /// `subtract` subtracts; any other operation adds
    pub fn from_host(op: &str) -> Self {
        if op == "subtract" {
            FieldOperation::Subtract
        } else {
            FieldOperation::Add
        }
    }
}

/// Runs the action against a contact store
pub struct UpdatePropertyAction<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> UpdatePropertyAction<'a, S>
where
    S: ContactStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn run(
        &self,
        subscriber_id: u64,
        assignments: &[PropertyAssignment],
    ) -> Result<ActionOutcome> {
        let mut values: HashMap<String, Value> = HashMap::new();
        let mut operations: Vec<(String, Value, FieldOperation)> = Vec::new();

        for pair in assignments.iter().filter(|p| !p.data_key.is_empty()) {
            match pair.operation() {
                Some(op) => operations.push((pair.data_key.clone(), pair.data_value.clone(), op)),
                None => {
                    values.insert(pair.data_key.clone(), pair.data_value.clone());
                }
            }
        }

        if values.is_empty() && operations.is_empty() {
            debug!(subscriber_id, "no properties configured, skipping");
            return Ok(ActionOutcome::Skipped);
        }

        if self.store.subscriber(subscriber_id).await?.is_none() {
            return Err(RuntimeError::NotFound(format!("subscriber {}", subscriber_id)));
        }

        let fields: HashMap<String, CustomFieldDefinition> = self
            .store
            .custom_field_definitions()
            .await?
            .into_iter()
            .map(|f| (f.slug.clone(), f))
            .collect();

        for (key, operand, op) in operations {
            let Some(field) = fields.get(&key) else {
                debug!(key = %key, "operation on a non-custom field ignored");
                continue;
            };
            if !field.is_number() && !field.is_multi_valued() {
                values.insert(key, operand);
                continue;
            }

            let existing = self
                .store
                .custom_field_value(subscriber_id, &key)
                .await?
                .filter(|v| !matches!(v, Value::Null) && v.as_str() != Some(""));
            let new_value = match existing {
                None => operand,
                Some(existing) if field.is_number() => apply_number(&existing, &operand, op),
                Some(existing) => apply_options(field, &existing, &operand, op),
            };
            values.insert(key, new_value);
        }

        let mut custom_values = HashMap::new();
        let mut main_values = HashMap::new();
        for (key, value) in values {
            match fields.get(&key) {
                Some(field) => {
                    if let Some(value) = format_custom_value(field, value) {
                        custom_values.insert(key, value);
                    }
                }
                None if !value.is_blank() => {
                    main_values.insert(key, value);
                }
                None => {}
            }
        }

        let custom_fields = if custom_values.is_empty() {
            Vec::new()
        } else {
            self.store
                .sync_custom_fields(subscriber_id, custom_values)
                .await?
        };
        let main_fields = if main_values.is_empty() {
            Vec::new()
        } else {
            self.store
                .update_main_fields(subscriber_id, main_values)
                .await?
        };

        debug!(
            subscriber_id,
            custom = custom_fields.len(),
            main = main_fields.len(),
            "contact properties updated"
        );

        Ok(ActionOutcome::Completed {
            custom_fields,
            main_fields,
        })
    }
}

/// Existing number plus or minus the integer part of the operand
fn apply_number(existing: &Value, operand: &Value, op: FieldOperation) -> Value {
    let current = existing.coerce_f64().unwrap_or(0.0);
    let delta = operand.coerce_f64().unwrap_or(0.0).trunc();
    match op {
        FieldOperation::Add => Value::number(current + delta),
        FieldOperation::Subtract => Value::number(current - delta),
    }
}

fn apply_options(
    field: &CustomFieldDefinition,
    existing: &Value,
    operand: &Value,
    op: FieldOperation,
) -> Value {
    let provided: Vec<String> = operand.to_list().iter().map(Value::to_text).collect();
    let provided: Vec<&String> = field
        .options
        .iter()
        .filter(|option| provided.contains(option))
        .collect();
    let existing: Vec<String> = existing.to_list().iter().map(Value::to_text).collect();

    let merged: Vec<String> = match op {
        FieldOperation::Add => {
            let mut merged = Vec::new();
            for item in existing.iter().chain(provided.into_iter()) {
                if !merged.contains(item) {
                    merged.push(item.clone());
                }
            }
            merged
        }
        FieldOperation::Subtract => existing
            .into_iter()
            .filter(|item| !provided.iter().any(|p| *p == item))
            .collect(),
    };
    Value::Array(merged.into_iter().map(Value::String).collect())
}

/// Shape a custom value for storage; `None` drops it
fn format_custom_value(field: &CustomFieldDefinition, value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(_) => Some(value),
        other if field.is_multi_valued() => {
            let text = other.to_text();
            let items: Vec<Value> = text
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Value::text)
                .collect();
            Some(Value::Array(items))
        }
        other => Some(other),
    }
}
