//! CRM Rules Runtime - Data access and execution for CRM filter rules
//!
//! This crate provides:
//! - Async data-access traits with an in-memory backend
//! - Single-contact condition evaluation and predicate execution
//! - SQL rendering of compiled predicates (optional SQLite execution)
//! - Randomized workflow delays and their diagnostic events
//! - Workflow actions, smart link clicks, webhook remapping and the events widget

pub mod actions;
pub mod delay;
pub mod error;
pub mod evaluator;
pub mod execution;
pub mod smart_link;
pub mod sql;
pub mod storage;
pub mod tracker;
pub mod webhook;
pub mod widget;

// Re-export main types
pub use actions::{ActionOutcome, FieldOperation, PropertyAssignment, UpdatePropertyAction};
pub use delay::{
    compute_delay, prepare_sequence, DelayDecision, DelayRandomizer, DelaySettings, WaitSequence,
    WaitUnit,
};
pub use error::{Result, RuntimeError};
pub use evaluator::ConditionEvaluator;
pub use execution::PredicateExecutor;
pub use smart_link::{
    AuthGateway, ClickOutcome, NoSmartCodes, SmartCodeParser, SmartLinkHandler, UserAccount,
};
pub use sql::{SqlDialect, SqlFragment, SqlParam, SqlRenderer};
pub use storage::{
    CommerceStore, ContactStore, CrmStore, CustomFieldDefinition, EventStore, InMemoryStore,
    NewEvent, ReviewRecord, SmartLink, SmartLinkActions, SmartLinkStore, Subscriber,
    SubscriptionRecord, TrackedEvent,
};
pub use tracker::WaitTimeRecorder;
pub use webhook::WebhookRemapper;
pub use widget::{event_widget, EventWidget};
