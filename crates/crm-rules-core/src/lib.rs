//! CRM Rules Core - Core types and compilers for CRM contact filtering rules
//!
//! This crate provides the pure, storage-independent parts of the rules engine:
//! - Value types for loosely typed host data
//! - Selection token parsing into selectors
//! - The predicate tree and the selection-to-predicate compiler
//! - Event-property keys, type inference and comparison compilation
//! - Error types

pub mod error;
pub mod event;
pub mod predicate;
pub mod selector;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use event::{
    compile_comparison, compile_event_clause, discover_properties, CompareOp, CompareValue,
    ComparisonMode, EventPropertyCheck, EventPropertyKey, EventSample, PropType, PropertyOption,
};
pub use predicate::{
    ExistenceCheck, FilterOutcome, Predicate, PredicateCompiler, RecordCondition, RecordField,
    RecordView, SkipReason,
};
pub use selector::{
    parse_review_token, parse_token, FilterClause, FilterOperator, ParsedSelection,
    RelationKind, SelectionParser, Selector, SelectorBuckets,
};
pub use types::Value;
