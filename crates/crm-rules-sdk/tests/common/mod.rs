//! Common test utilities for SDK integration tests

use crm_rules_core::{FilterClause, Value};
use crm_rules_runtime::{
    CustomFieldDefinition, InMemoryStore, ReviewRecord, SmartLink, SmartLinkActions, Subscriber,
    SubscriptionRecord,
};
use crm_rules_sdk::{Engine, EngineBuilder, EngineConfig};
use std::sync::Arc;

pub const WEBHOOK_ID: u64 = 61;

/// Engine over a seeded in-memory store
pub struct TestEngine {
    pub store: Arc<InMemoryStore>,
    pub engine: Engine,
}

impl TestEngine {
    /// Seeded store, event tracking on, tracker contact `ops@example.com`
    pub async fn new() -> Self {
        Self::with_config(
            EngineConfig::new()
                .with_event_tracking(true)
                .with_tracker_email("ops@example.com"),
        )
        .await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(seeded_store().await);
        let engine = EngineBuilder::new()
            .with_config(config)
            .with_store(store.clone())
            .build()
            .expect("engine builds");
        Self { store, engine }
    }

    pub async fn subscriber(&self, id: u64) -> Subscriber {
        use crm_rules_runtime::ContactStore;
        self.store
            .subscriber(id)
            .await
            .expect("store read")
            .expect("seeded subscriber")
    }
}

/// Contacts:
/// 1 `a@example.com`, user 100, customer 10 with an active 42/7 subscription
/// 2 `b@example.com`, no commerce link, guest review of product 42
/// 3 `ops@example.com`, tracker contact
pub async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store
        .add_subscriber(Subscriber::new(1, "a@example.com").with_user_id(100))
        .await;
    store.add_subscriber(Subscriber::new(2, "b@example.com")).await;
    store.add_subscriber(Subscriber::new(3, "ops@example.com")).await;

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
        .add_review(ReviewRecord {
            id: 1,
            product_id: 42,
            user_id: 0,
            author_email: "b@example.com".to_string(),
            approved: "1".to_string(),
            kind: "edd_review".to_string(),
        })
        .await;

    store
        .add_custom_field(CustomFieldDefinition::new("score", "number"))
        .await;
    store
        .add_custom_field(
            CustomFieldDefinition::new("interests", "checkbox").with_options(["rust", "go", "php"]),
        )
        .await;
    store.set_custom_value(1, "score", Value::Int(5)).await;

    store
        .add_smart_link(SmartLink {
            id: 1,
            slug: "promo".to_string(),
            target_url: "https://shop.example.com/sale?ref=mail".to_string(),
            actions: SmartLinkActions {
                tags: vec![4],
                lists: vec![2],
                ..SmartLinkActions::default()
            },
            all_clicks: 0,
            contact_clicks: 0,
        })
        .await;

    store
}

/// Selector clause for a host property key
pub fn selector_clause(property: &str, operator: &str, tokens: &[&str]) -> FilterClause {
    let value = Value::Array(tokens.iter().map(|t| Value::text(*t)).collect());
    FilterClause::new(property, operator, value)
}

/// Event property clause, `key` is `event_key:prop_name[:type]`
pub fn event_clause(operator: &str, value: &str, key: &str) -> FilterClause {
    FilterClause::new("event_tracking_json_prop", operator, Value::text(value))
        .with_extra_value(key)
}
