//! SDK error types

use thiserror::Error;

/// SDK error type
#[derive(Error, Debug)]
pub enum SdkError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Core error
    #[error("Core error: {0}")]
    CoreError(#[from] crm_rules_core::CoreError),

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(#[from] crm_rules_runtime::RuntimeError),

    /// YAML error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Hook point without a registered handler
    #[error("No handler registered for hook point: {0}")]
    UnhandledHook(String),

    /// Engine not initialized
    #[error("Engine not initialized")]
    NotInitialized,
}

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;
