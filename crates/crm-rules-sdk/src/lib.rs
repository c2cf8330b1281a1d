//! CRM Rules SDK
//!
//! Hook-point engine for contact filters, automation conditions, workflow
//! waits and actions, smart links and inbound webhooks.

pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod registry;

// Re-export main types
pub use builder::EngineBuilder;
pub use config::{EngineConfig, FeatureFlags, SqlConfig, WebhookConfig};
pub use engine::{ContactFilter, Engine, EventTrackedOutcome, NoSession};
pub use error::{Result, SdkError};
pub use handlers::{EddProHandler, EventTrackingHandler, FilterGroupHandler, HookContext};
pub use logging::init_tracing;
pub use registry::{FilterGroup, HookPoint, HookRegistry};

// Re-export commonly used types from dependencies
pub use crm_rules_core::{FilterClause, FilterOutcome, Value};
pub use crm_rules_runtime::{
    ActionOutcome, DelaySettings, InMemoryStore, PropertyAssignment, Subscriber, WaitSequence,
};
