//! Error types for the rules core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid event property key: {0}")]
    InvalidPropertyKey(String),

    #[error("Unknown comparison operator: {0}")]
    UnknownOperator(String),

    #[error("Relation {relation} does not support {what}")]
    UnsupportedRelation { relation: String, what: String },

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
