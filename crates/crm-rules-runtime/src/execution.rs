//! Predicate execution against a data-access backend
//!
//! Evaluates a compiled [`Predicate`] for one contact by reading the related
//! records through the storage traits. This is the reference semantics the
//! SQL renderer has to reproduce.

use crate::error::{Result, RuntimeError};
use crate::storage::{CommerceStore, EventStore, Subscriber};
use crm_rules_core::{ComparisonMode, EventPropertyCheck, ExistenceCheck, Predicate, RelationKind};
use futures::future::BoxFuture;
use futures::FutureExt;

/// Evaluates predicates for single contacts
pub struct PredicateExecutor<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> PredicateExecutor<'a, S>
where
    S: CommerceStore + EventStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Whether the contact satisfies the predicate
    pub fn evaluate<'b>(
        &'b self,
        predicate: &'b Predicate,
        subject: &'b Subscriber,
    ) -> BoxFuture<'b, Result<bool>> {
        async move {
            match predicate {
                Predicate::Exists(check) => self.exists(check, subject).await,
                Predicate::EventProperty(check) => self.event_property(check, subject).await,
                Predicate::NoLinkedAccount { provider } => Ok(self
                    .store
                    .linked_account(subject.id, provider)
                    .await?
                    .is_none()),
                Predicate::Not(inner) => Ok(!self.evaluate(inner, subject).await?),
                Predicate::All(items) => {
                    for item in items {
                        if !self.evaluate(item, subject).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                Predicate::Any(items) => {
                    for item in items {
                        if self.evaluate(item, subject).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
            }
        }
        .boxed()
    }

    async fn exists(&self, check: &ExistenceCheck, subject: &Subscriber) -> Result<bool> {
        match check.relation {
            RelationKind::ActiveSubscription => {
                let provider = check.relation.link_provider().unwrap_or("edd");
                let customer_id = match self.store.linked_account(subject.id, provider).await? {
                    Some(id) => id,
                    None => return Ok(false),
                };
                let subscriptions = self.store.subscriptions_for(customer_id).await?;
                Ok(subscriptions.iter().any(|s| check.condition.matches(s)))
            }
            RelationKind::LeftReview => {
                let reviews = self.store.reviews_by(subject).await?;
                Ok(reviews.iter().any(|r| check.condition.matches(r)))
            }
            RelationKind::EventJsonProperty => Err(RuntimeError::UnsupportedPredicate(
                "existence checks on event properties".to_string(),
            )),
        }
    }

    async fn event_property(&self, check: &EventPropertyCheck, subject: &Subscriber) -> Result<bool> {
        let events = self
            .store
            .events_for(subject.id, Some(&check.event_key))
            .await?;

        let matched = match check.mode {
            ComparisonMode::Latest => events
                .first()
                .is_some_and(|e| check.matches_event_value(&e.value)),
            ComparisonMode::AnyEvent => events.iter().any(|e| check.matches_event_value(&e.value)),
        };
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStore, SubscriptionRecord};
    use crm_rules_core::{FilterOperator, PredicateCompiler};

    async fn store_with_subscription() -> InMemoryStore {
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
    }

    fn compile(tokens: &[&str], operator: FilterOperator) -> Predicate {
        PredicateCompiler::new()
            .compile_tokens(tokens, operator, RelationKind::ActiveSubscription)
            .unwrap()
            .into_predicate()
            .unwrap()
    }

    #[tokio::test]
    async fn test_entire_entity_matches_variant_subscription() {
        let store = store_with_subscription().await;
        let executor = PredicateExecutor::new(&store);
        let subject = Subscriber::new(1, "a@example.com");

        let predicate = compile(&["42-all"], FilterOperator::Include);
        assert!(executor.evaluate(&predicate, &subject).await.unwrap());

        let predicate = compile(&["42-0"], FilterOperator::Include);
        assert!(!executor.evaluate(&predicate, &subject).await.unwrap());
    }

    #[tokio::test]
    async fn test_exclude_any_without_link() {
        let store = InMemoryStore::new();
        let executor = PredicateExecutor::new(&store);
        let subject = Subscriber::new(2, "b@example.com");

        let predicate = compile(&["any"], FilterOperator::Exclude);
        assert!(executor.evaluate(&predicate, &subject).await.unwrap());
    }

    #[tokio::test]
    async fn test_event_relation_existence_is_rejected() {
        let store = InMemoryStore::new();
        let executor = PredicateExecutor::new(&store);
        let predicate = Predicate::exists(
            RelationKind::EventJsonProperty,
            crm_rules_core::RecordCondition::All(vec![]),
        );
        let result = executor
            .evaluate(&predicate, &Subscriber::new(1, "a@example.com"))
            .await;
        assert!(matches!(result, Err(RuntimeError::UnsupportedPredicate(_))));
    }
}
