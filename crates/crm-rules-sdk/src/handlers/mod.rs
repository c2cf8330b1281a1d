//! Filter group handlers
//!
//! A handler answers the contact-filter and automation-condition hooks of
//! one [`FilterGroup`](crate::registry::FilterGroup).

mod edd;
mod event_tracking;

pub use edd::EddProHandler;
pub use event_tracking::EventTrackingHandler;

use crate::config::FeatureFlags;
use crate::error::Result;
use crate::registry::FilterGroup;
use async_trait::async_trait;
use crm_rules_core::{ComparisonMode, FilterClause, FilterOutcome};
use crm_rules_runtime::{CrmStore, Subscriber};

/// What an assessment may read
pub struct HookContext<'a> {
    pub store: &'a dyn CrmStore,
    pub features: &'a FeatureFlags,
    /// `Latest` while an event is being ingested, `AnyEvent` otherwise
    pub mode: ComparisonMode,
}

#[async_trait]
pub trait FilterGroupHandler: Send + Sync {
    fn group(&self) -> FilterGroup;

    /// Compile one contact-filter clause of this group.
    ///
    /// Clauses for other groups come back as `Skip(NotApplicable)`.
    fn filter(&self, clause: &FilterClause, features: &FeatureFlags) -> Result<FilterOutcome>;

    /// Fold this group's conditions into the prior assessment result
    async fn assess(
        &self,
        ctx: &HookContext<'_>,
        prior: bool,
        conditions: &[FilterClause],
        subject: &Subscriber,
    ) -> Result<bool>;
}
