//! Selection tokens, selectors and filter clauses
//!
//! Multi-select filter forms post opaque option tokens; this module turns
//! them into structured selectors grouped by kind.

pub mod parser;
pub mod types;

pub use parser::{parse_review_token, parse_token, SelectionParser};
pub use types::{
    FilterClause, FilterOperator, ParsedSelection, RelationKind, Selector, SelectorBuckets,
};
