//! Tracked-event JSON property filters

use super::{FilterGroupHandler, HookContext};
use crate::config::FeatureFlags;
use crate::error::Result;
use crate::registry::FilterGroup;
use async_trait::async_trait;
use crm_rules_core::{
    compile_event_clause, ComparisonMode, FilterClause, FilterOutcome, RelationKind, SkipReason,
};
use crm_rules_runtime::{PredicateExecutor, Subscriber};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct EventTrackingHandler;

impl EventTrackingHandler {
    pub fn new() -> Self {
        Self
    }

    fn applies_to(clause: &FilterClause) -> bool {
        clause.relation() == Some(RelationKind::EventJsonProperty)
    }
}

#[async_trait]
impl FilterGroupHandler for EventTrackingHandler {
    fn group(&self) -> FilterGroup {
        FilterGroup::EventTracking
    }

    fn filter(&self, clause: &FilterClause, features: &FeatureFlags) -> Result<FilterOutcome> {
        if !Self::applies_to(clause) {
            return Ok(FilterOutcome::Skip(SkipReason::NotApplicable));
        }
        if !features.event_tracking {
            debug!("event tracking disabled, filter skipped");
            return Ok(FilterOutcome::Skip(SkipReason::FeatureDisabled));
        }
        Ok(compile_event_clause(clause, ComparisonMode::AnyEvent))
    }

    async fn assess(
        &self,
        ctx: &HookContext<'_>,
        prior: bool,
        conditions: &[FilterClause],
        subject: &Subscriber,
    ) -> Result<bool> {
        let executor = PredicateExecutor::new(ctx.store);

        for clause in conditions.iter().filter(|c| Self::applies_to(c)) {
            if !ctx.features.event_tracking {
                return Ok(prior);
            }

            let FilterOutcome::Apply(predicate) = compile_event_clause(clause, ctx.mode) else {
                continue;
            };
            if !executor.evaluate(&predicate, subject).await? {
                debug!(
                    subscriber_id = subject.id,
                    property = ?clause.extra_value,
                    mode = ?ctx.mode,
                    "event condition failed"
                );
                return Ok(false);
            }
        }
        Ok(prior)
    }
}
