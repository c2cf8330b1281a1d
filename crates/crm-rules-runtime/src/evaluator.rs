//! Condition evaluator
//!
//! Single-contact counterpart of the predicate compiler used at automation
//! decision points. It applies the same `Any` short-circuit and polarity
//! rules, but asks the data layer directly instead of building a predicate.

use crate::error::{Result, RuntimeError};
use crate::storage::{CommerceStore, Subscriber, SubscriptionQuery};
use crm_rules_core::{
    FilterOperator, RelationKind, SelectionParser, Selector, SelectorBuckets,
};
use tracing::debug;

/// Evaluates selector conditions for one contact
pub struct ConditionEvaluator<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> ConditionEvaluator<'a, S>
where
    S: CommerceStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Parse raw tokens for the relation and evaluate them
    pub async fn evaluate_tokens<T: AsRef<str>>(
        &self,
        tokens: &[T],
        operator: FilterOperator,
        relation: RelationKind,
        subject: &Subscriber,
    ) -> Result<bool> {
        let parsed = SelectionParser::new(relation).parse(tokens);
        self.evaluate(&parsed.selectors, operator, relation, subject)
            .await
    }

    /// Whether the contact passes the condition.
    ///
    /// A selection without usable selectors does not restrict and passes.
    pub async fn evaluate(
        &self,
        selectors: &[Selector],
        operator: FilterOperator,
        relation: RelationKind,
        subject: &Subscriber,
    ) -> Result<bool> {
        let buckets = SelectorBuckets::from_selectors(selectors);
        if buckets.is_empty() {
            debug!(relation = %relation, "no usable selectors, condition passes");
            return Ok(true);
        }

        let has_match = match relation {
            RelationKind::ActiveSubscription => self.has_subscription(&buckets, subject).await?,
            RelationKind::LeftReview => self.has_review(&buckets, subject).await?,
            RelationKind::EventJsonProperty => {
                return Err(RuntimeError::UnsupportedPredicate(
                    "selector conditions on event properties".to_string(),
                ))
            }
        };

        debug!(
            relation = %relation,
            operator = operator.as_str(),
            subscriber_id = subject.id,
            has_match,
            "evaluated condition"
        );

        Ok(match operator {
            FilterOperator::Include => has_match,
            FilterOperator::Exclude => !has_match,
        })
    }

    async fn has_subscription(
        &self,
        buckets: &SelectorBuckets,
        subject: &Subscriber,
    ) -> Result<bool> {
        let provider = RelationKind::ActiveSubscription
            .link_provider()
            .unwrap_or("edd");
        let customer_id = match self.store.linked_account(subject.id, provider).await? {
            Some(id) => id,
            None => return Ok(false),
        };

        let query = if buckets.any {
            SubscriptionQuery::AnyProduct
        } else {
            SubscriptionQuery::Matching {
                products: buckets.entire.clone(),
                simple_products: buckets.simple.clone(),
                variants: buckets.variants.clone(),
            }
        };
        self.store.has_active_subscription(customer_id, &query).await
    }

    async fn has_review(&self, buckets: &SelectorBuckets, subject: &Subscriber) -> Result<bool> {
        if subject.site_user().is_none() && subject.email.is_empty() {
            return Ok(false);
        }

        let product_ids: Vec<u64> = if buckets.any {
            Vec::new()
        } else {
            let mut ids = Vec::new();
            let all = buckets
                .entire
                .iter()
                .chain(buckets.simple.iter())
                .chain(buckets.variants.iter().map(|(id, _)| id));
            for id in all {
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
            ids
        };
        Ok(self.store.count_approved_reviews(subject, &product_ids).await? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStore, ReviewRecord, SubscriptionRecord};

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.add_subscriber(Subscriber::new(1, "a@example.com")).await;
        store.link_account(1, "edd", 10).await;
        store
            .add_subscription(SubscriptionRecord {
                id: 1,
                customer_id: 10,
                product_id: 42,
                price_id: Some(7),
                status: "active".into(),
            })
            .await;
        store
            .add_review(ReviewRecord {
                id: 1,
                product_id: 5,
                user_id: 0,
                author_email: "a@example.com".into(),
                approved: "1".into(),
                kind: "edd_review".into(),
            })
            .await;
        store
    }

    #[tokio::test]
    async fn test_entire_entity_include() {
        let store = seeded().await;
        let evaluator = ConditionEvaluator::new(&store);
        let subject = Subscriber::new(1, "a@example.com");

        assert!(evaluator
            .evaluate_tokens(
                &["42-all"],
                FilterOperator::Include,
                RelationKind::ActiveSubscription,
                &subject
            )
            .await
            .unwrap());
        assert!(!evaluator
            .evaluate_tokens(
                &["42-all"],
                FilterOperator::Exclude,
                RelationKind::ActiveSubscription,
                &subject
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_simple_product_does_not_match_variant() {
        let store = seeded().await;
        let evaluator = ConditionEvaluator::new(&store);
        let subject = Subscriber::new(1, "a@example.com");

        assert!(!evaluator
            .evaluate_tokens(
                &["42-0"],
                FilterOperator::Include,
                RelationKind::ActiveSubscription,
                &subject
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_exclude_any_without_link_passes() {
        let store = seeded().await;
        let evaluator = ConditionEvaluator::new(&store);
        let stranger = Subscriber::new(2, "b@example.com");

        assert!(evaluator
            .evaluate_tokens(
                &["any"],
                FilterOperator::Exclude,
                RelationKind::ActiveSubscription,
                &stranger
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_review_by_guest_email() {
        let store = seeded().await;
        let evaluator = ConditionEvaluator::new(&store);
        let subject = Subscriber::new(1, "a@example.com");

        assert!(evaluator
            .evaluate_tokens(&["5"], FilterOperator::Include, RelationKind::LeftReview, &subject)
            .await
            .unwrap());
        assert!(!evaluator
            .evaluate_tokens(&["6"], FilterOperator::Include, RelationKind::LeftReview, &subject)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_garbage_selection_passes() {
        let store = seeded().await;
        let evaluator = ConditionEvaluator::new(&store);
        let subject = Subscriber::new(1, "a@example.com");

        assert!(evaluator
            .evaluate_tokens(
                &["junk", "0-all"],
                FilterOperator::Include,
                RelationKind::ActiveSubscription,
                &subject
            )
            .await
            .unwrap());
    }
}
