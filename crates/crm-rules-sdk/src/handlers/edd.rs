//! Subscription and review filters

use super::{FilterGroupHandler, HookContext};
use crate::config::FeatureFlags;
use crate::error::Result;
use crate::registry::FilterGroup;
use async_trait::async_trait;
use crm_rules_core::{FilterClause, FilterOutcome, PredicateCompiler, RelationKind, SkipReason};
use crm_rules_runtime::{ConditionEvaluator, Subscriber};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy)]
pub struct EddProHandler {
    compiler: PredicateCompiler,
}

impl EddProHandler {
    pub fn new() -> Self {
        Self {
            compiler: PredicateCompiler::new(),
        }
    }

    fn relation_of(clause: &FilterClause) -> Option<RelationKind> {
        match clause.relation() {
            Some(relation @ (RelationKind::ActiveSubscription | RelationKind::LeftReview)) => {
                Some(relation)
            }
            _ => None,
        }
    }
}

/// Backing plugin for the relation is switched off
fn provider_missing(relation: RelationKind, features: &FeatureFlags) -> bool {
    if !features.commerce_enabled {
        return true;
    }
    match relation {
        RelationKind::ActiveSubscription => !features.recurring_subscriptions,
        RelationKind::LeftReview => !features.reviews,
        RelationKind::EventJsonProperty => true,
    }
}

#[async_trait]
impl FilterGroupHandler for EddProHandler {
    fn group(&self) -> FilterGroup {
        FilterGroup::EddPro
    }

    fn filter(&self, clause: &FilterClause, features: &FeatureFlags) -> Result<FilterOutcome> {
        let Some(relation) = Self::relation_of(clause) else {
            return Ok(FilterOutcome::Skip(SkipReason::NotApplicable));
        };
        if provider_missing(relation, features) {
            debug!(relation = %relation, "provider unavailable, filter skipped");
            return Ok(FilterOutcome::Skip(SkipReason::ProviderMissing));
        }

        let outcome =
            self.compiler
                .compile_tokens(&clause.tokens(), clause.filter_operator(), relation)?;
        if let FilterOutcome::Skip(reason) = &outcome {
            debug!(relation = %relation, reason = reason.as_str(), "filter skipped");
        }
        Ok(outcome)
    }

    async fn assess(
        &self,
        ctx: &HookContext<'_>,
        prior: bool,
        conditions: &[FilterClause],
        subject: &Subscriber,
    ) -> Result<bool> {
        if !prior {
            return Ok(false);
        }

        let evaluator = ConditionEvaluator::new(ctx.store);
        for clause in conditions {
            let Some(relation) = Self::relation_of(clause) else {
                continue;
            };
            if provider_missing(relation, ctx.features) {
                return Ok(prior);
            }

            let passed = evaluator
                .evaluate_tokens(&clause.tokens(), clause.filter_operator(), relation, subject)
                .await?;
            if !passed {
                debug!(
                    subscriber_id = subject.id,
                    property = %clause.property,
                    "condition failed"
                );
                return Ok(false);
            }
        }
        Ok(prior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_rules_core::{ComparisonMode, Value};
    use crm_rules_runtime::{InMemoryStore, SubscriptionRecord};

    fn clause(property: &str, operator: &str, tokens: &[&str]) -> FilterClause {
        let value = Value::Array(tokens.iter().map(|t| Value::text(*t)).collect());
        FilterClause::new(property, operator, value)
    }

    async fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.add_subscriber(Subscriber::new(1, "a@example.com")).await;
        store.link_account(1, "edd", 10).await;
        store
            .add_subscription(SubscriptionRecord {
                id: 1,
                customer_id: 10,
                product_id: 42,
                price_id: Some(7),
                status: "active".to_string(),
            })
            .await;
        store
    }

    #[test]
    fn test_filter_compiles_subscription_clause() {
        let handler = EddProHandler::new();
        let outcome = handler
            .filter(
                &clause("edd_pro_active_subscription", "in", &["42-all"]),
                &FeatureFlags::default(),
            )
            .unwrap();
        assert!(!outcome.is_skip());
    }

    #[test]
    fn test_filter_skips() {
        let handler = EddProHandler::new();
        let features = FeatureFlags {
            reviews: false,
            ..FeatureFlags::default()
        };

        let review = clause("edd_pro_has_left_review", "in", &["5"]);
        assert_eq!(
            handler.filter(&review, &features).unwrap(),
            FilterOutcome::Skip(SkipReason::ProviderMissing)
        );

        let other = clause("event_tracking_json_prop", "=", &["1"]);
        assert_eq!(
            handler.filter(&other, &features).unwrap(),
            FilterOutcome::Skip(SkipReason::NotApplicable)
        );

        let empty = clause("edd_pro_active_subscription", "in", &[]);
        assert_eq!(
            handler.filter(&empty, &features).unwrap(),
            FilterOutcome::Skip(SkipReason::NoSelection)
        );
    }

    #[tokio::test]
    async fn test_assess() {
        let store = store().await;
        let features = FeatureFlags::default();
        let ctx = HookContext {
            store: &store,
            features: &features,
            mode: ComparisonMode::AnyEvent,
        };
        let subject = Subscriber::new(1, "a@example.com");
        let handler = EddProHandler::new();

        let owns = [clause("edd_pro_active_subscription", "in", &["42-7"])];
        let lacks = [clause("edd_pro_active_subscription", "in", &["43-all"])];

        assert!(handler.assess(&ctx, true, &owns, &subject).await.unwrap());
        assert!(!handler.assess(&ctx, false, &owns, &subject).await.unwrap());
        assert!(!handler.assess(&ctx, true, &lacks, &subject).await.unwrap());
    }

    #[tokio::test]
    async fn test_assess_disabled_keeps_prior() {
        let store = store().await;
        let features = FeatureFlags {
            recurring_subscriptions: false,
            ..FeatureFlags::default()
        };
        let ctx = HookContext {
            store: &store,
            features: &features,
            mode: ComparisonMode::AnyEvent,
        };
        let subject = Subscriber::new(1, "a@example.com");
        let lacks = [clause("edd_pro_active_subscription", "in", &["43-all"])];

        assert!(EddProHandler::new()
            .assess(&ctx, true, &lacks, &subject)
            .await
            .unwrap());
    }
}
