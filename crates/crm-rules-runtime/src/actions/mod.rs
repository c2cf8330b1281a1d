//! Workflow actions

pub mod update_property;

pub use update_property::{FieldOperation, PropertyAssignment, UpdatePropertyAction};

use serde::{Deserialize, Serialize};

/// Result of running an action for one contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Nothing to do; the workflow marks the step skipped
    Skipped,
    Completed {
        custom_fields: Vec<String>,
        main_fields: Vec<String>,
    },
}

impl ActionOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, ActionOutcome::Skipped)
    }

    /// Whether any stored field changed
    pub fn changed(&self) -> bool {
        match self {
            ActionOutcome::Skipped => false,
            ActionOutcome::Completed {
                custom_fields,
                main_fields,
            } => !custom_fields.is_empty() || !main_fields.is_empty(),
        }
    }
}
