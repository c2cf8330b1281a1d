//! Data access layer
//!
//! Async traits over the CRM and commerce tables the rules read and write.
//! Every compiler, evaluator and action receives one of these explicitly;
//! nothing reaches for a global database handle.

pub mod memory;

pub use memory::InMemoryStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use crm_rules_core::{EventSample, RecordField, RecordView, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A CRM contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Subscriber {
    pub id: u64,
    /// Linked site user, if any
    #[serde(default)]
    pub user_id: Option<u64>,
    pub email: String,
}

impl Subscriber {
    pub fn new(id: u64, email: impl Into<String>) -> Self {
        Self {
            id,
            user_id: None,
            email: email.into(),
        }
    }

    pub fn with_user_id(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Site user id when it is set and positive
    pub fn site_user(&self) -> Option<u64> {
        self.user_id.filter(|id| *id > 0)
    }
}

/// Commerce customer account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub id: u64,
    #[serde(default)]
    pub user_id: Option<u64>,
    pub email: String,
}

/// Link from a contact to an external account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactLink {
    pub subscriber_id: u64,
    pub provider: String,
    pub provider_id: u64,
}

/// Recurring subscription row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: u64,
    pub customer_id: u64,
    pub product_id: u64,
    /// Price (variant) id, unset for simple products
    #[serde(default)]
    pub price_id: Option<u64>,
    pub status: String,
}

impl RecordView for SubscriptionRecord {
    fn field(&self, field: RecordField) -> Value {
        match field {
            RecordField::ProductId => Value::from(self.product_id),
            RecordField::VariantId => self.price_id.map(Value::from).unwrap_or_default(),
            RecordField::Status => Value::text(&self.status),
            RecordField::Kind => Value::Null,
        }
    }
}

/// Product review stored as a comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: u64,
    pub product_id: u64,
    /// Author's site user id, 0 for guests
    pub user_id: u64,
    pub author_email: String,
    /// Approval flag, `"1"` when approved
    pub approved: String,
    /// Comment type
    pub kind: String,
}

impl ReviewRecord {
    /// Whether the review was written by the contact.
    ///
    /// Logged-in authors match on user id; guest reviews match on email.
    pub fn written_by(&self, subscriber: &Subscriber) -> bool {
        match subscriber.site_user() {
            Some(user_id) if self.user_id > 0 && self.user_id == user_id => return true,
            _ => {}
        }
        self.user_id == 0 && !subscriber.email.is_empty() && self.author_email == subscriber.email
    }
}

impl RecordView for ReviewRecord {
    fn field(&self, field: RecordField) -> Value {
        match field {
            RecordField::ProductId => Value::from(self.product_id),
            RecordField::VariantId => Value::Null,
            RecordField::Status => Value::text(&self.approved),
            RecordField::Kind => Value::text(&self.kind),
        }
    }
}

/// Stored tracked event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub id: u64,
    pub subscriber_id: u64,
    pub event_key: String,
    pub title: String,
    /// Raw value, often a JSON object
    pub value: String,
    pub provider: String,
    pub counter: u32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Event to record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_key: String,
    pub title: String,
    pub value: String,
    /// Contact to attach the event to, resolved by email
    pub email: String,
    pub provider: String,
}

/// One page of a contact's events, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<TrackedEvent>,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
}

/// Custom contact field definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    pub slug: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl CustomFieldDefinition {
    pub fn new(slug: impl Into<String>, field_type: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            label: slug.clone(),
            slug,
            field_type: field_type.into(),
            options: Vec::new(),
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Checkbox and multi-select fields hold a list of options
    pub fn is_multi_valued(&self) -> bool {
        matches!(self.field_type.as_str(), "checkbox" | "select-multi")
    }

    pub fn is_number(&self) -> bool {
        self.field_type == "number"
    }
}

/// Tag and list changes applied when a smart link is clicked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SmartLinkActions {
    #[serde(default)]
    pub tags: Vec<u64>,
    #[serde(default)]
    pub lists: Vec<u64>,
    #[serde(default)]
    pub remove_tags: Vec<u64>,
    #[serde(default)]
    pub remove_lists: Vec<u64>,
    #[serde(default)]
    pub auto_login: bool,
}

/// Tracked redirect link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartLink {
    pub id: u64,
    pub slug: String,
    pub target_url: String,
    #[serde(default)]
    pub actions: SmartLinkActions,
    #[serde(default)]
    pub all_clicks: u64,
    #[serde(default)]
    pub contact_clicks: u64,
}

/// Selection applied to a customer's subscriptions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionQuery {
    /// Any active subscription
    AnyProduct,
    /// Active subscription matching one of the selections
    Matching {
        /// Any variant of these products
        products: Vec<u64>,
        /// These products with no variant
        simple_products: Vec<u64>,
        /// These product / variant pairs
        variants: Vec<(u64, u64)>,
    },
}

impl SubscriptionQuery {
    /// Whether an active subscription record satisfies the query
    pub fn matches(&self, record: &SubscriptionRecord) -> bool {
        if record.status != crm_rules_core::predicate::compiler::ACTIVE_STATUS {
            return false;
        }
        match self {
            SubscriptionQuery::AnyProduct => true,
            SubscriptionQuery::Matching {
                products,
                simple_products,
                variants,
            } => {
                let variant = record.price_id.unwrap_or(0);
                products.contains(&record.product_id)
                    || (variant == 0 && simple_products.contains(&record.product_id))
                    || variants.contains(&(record.product_id, variant))
            }
        }
    }
}

/// Commerce data: customers, subscriptions, reviews
#[async_trait]
pub trait CommerceStore: Send + Sync {
    /// External account id the contact is linked to for `provider`
    async fn linked_account(&self, subscriber_id: u64, provider: &str) -> Result<Option<u64>>;

    /// Subscriptions of a customer
    async fn subscriptions_for(&self, customer_id: u64) -> Result<Vec<SubscriptionRecord>>;

    /// Review comments written by the contact, any status
    async fn reviews_by(&self, subscriber: &Subscriber) -> Result<Vec<ReviewRecord>>;

    /// Whether the customer holds an active subscription matching the query
    async fn has_active_subscription(
        &self,
        customer_id: u64,
        query: &SubscriptionQuery,
    ) -> Result<bool> {
        let subscriptions = self.subscriptions_for(customer_id).await?;
        Ok(subscriptions.iter().any(|s| query.matches(s)))
    }

    /// Approved product reviews by the contact, limited to `product_ids` when non-empty
    async fn count_approved_reviews(
        &self,
        subscriber: &Subscriber,
        product_ids: &[u64],
    ) -> Result<u64> {
        use crm_rules_core::predicate::compiler::{APPROVED_STATUS, REVIEW_KIND};

        let reviews = self.reviews_by(subscriber).await?;
        let count = reviews
            .iter()
            .filter(|r| r.approved == APPROVED_STATUS && r.kind == REVIEW_KIND)
            .filter(|r| product_ids.is_empty() || product_ids.contains(&r.product_id))
            .count();
        Ok(count as u64)
    }
}

/// Tracked events
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Events of a contact, newest first, optionally limited to one key
    async fn events_for(
        &self,
        subscriber_id: u64,
        event_key: Option<&str>,
    ) -> Result<Vec<TrackedEvent>>;

    /// Newest row of every event key, for property discovery
    async fn latest_per_key(&self) -> Result<Vec<EventSample>>;

    /// One page of a contact's events ordered by last update, newest first
    async fn page_for_subscriber(
        &self,
        subscriber_id: u64,
        page: u64,
        per_page: u64,
    ) -> Result<EventPage>;

    /// Record an event
    async fn track(&self, event: NewEvent) -> Result<TrackedEvent>;
}

/// Contacts and their custom fields
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn subscriber(&self, subscriber_id: u64) -> Result<Option<Subscriber>>;

    async fn custom_field_definitions(&self) -> Result<Vec<CustomFieldDefinition>>;

    /// Current value of one custom field, `None` when unset
    async fn custom_field_value(&self, subscriber_id: u64, slug: &str) -> Result<Option<Value>>;

    /// Write custom field values, returning the slugs whose value changed
    async fn sync_custom_fields(
        &self,
        subscriber_id: u64,
        values: HashMap<String, Value>,
    ) -> Result<Vec<String>>;

    /// Write main contact fields, returning the keys whose value changed
    async fn update_main_fields(
        &self,
        subscriber_id: u64,
        values: HashMap<String, Value>,
    ) -> Result<Vec<String>>;

    async fn attach_tags(&self, subscriber_id: u64, tag_ids: &[u64]) -> Result<()>;
    async fn detach_tags(&self, subscriber_id: u64, tag_ids: &[u64]) -> Result<()>;
    async fn attach_lists(&self, subscriber_id: u64, list_ids: &[u64]) -> Result<()>;
    async fn detach_lists(&self, subscriber_id: u64, list_ids: &[u64]) -> Result<()>;
}

/// Smart links
#[async_trait]
pub trait SmartLinkStore: Send + Sync {
    async fn smart_link(&self, slug: &str) -> Result<Option<SmartLink>>;

    /// Increment click counters, returning the updated link
    async fn record_click(&self, link_id: u64, by_contact: bool) -> Result<SmartLink>;
}

/// Every data surface the rules touch
pub trait CrmStore: CommerceStore + EventStore + ContactStore + SmartLinkStore {}

impl<T> CrmStore for T where T: CommerceStore + EventStore + ContactStore + SmartLinkStore {}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(product: u64, price: Option<u64>, status: &str) -> SubscriptionRecord {
        SubscriptionRecord {
            id: 1,
            customer_id: 1,
            product_id: product,
            price_id: price,
            status: status.to_string(),
        }
    }

    #[test]
    fn test_subscription_query_matching() {
        let query = SubscriptionQuery::Matching {
            products: vec![42],
            simple_products: vec![7],
            variants: vec![(9, 2)],
        };

        assert!(query.matches(&subscription(42, Some(3), "active")));
        assert!(query.matches(&subscription(7, None, "active")));
        assert!(query.matches(&subscription(7, Some(0), "active")));
        assert!(!query.matches(&subscription(7, Some(1), "active")));
        assert!(query.matches(&subscription(9, Some(2), "active")));
        assert!(!query.matches(&subscription(9, Some(3), "active")));
        assert!(!query.matches(&subscription(42, None, "cancelled")));
    }

    #[test]
    fn test_review_authorship() {
        let review = ReviewRecord {
            id: 1,
            product_id: 5,
            user_id: 0,
            author_email: "guest@example.com".into(),
            approved: "1".into(),
            kind: "edd_review".into(),
        };

        assert!(review.written_by(&Subscriber::new(1, "guest@example.com")));
        assert!(!review.written_by(&Subscriber::new(1, "other@example.com")));
        assert!(!review.written_by(&Subscriber::new(1, "")));

        let member_review = ReviewRecord {
            user_id: 12,
            author_email: "member@example.com".into(),
            ..review
        };
        assert!(member_review.written_by(&Subscriber::new(2, "x@example.com").with_user_id(12)));
        assert!(!member_review.written_by(&Subscriber::new(2, "member@example.com")));
    }

    #[test]
    fn test_custom_field_kinds() {
        assert!(CustomFieldDefinition::new("tags", "checkbox").is_multi_valued());
        assert!(CustomFieldDefinition::new("interests", "select-multi").is_multi_valued());
        assert!(CustomFieldDefinition::new("score", "number").is_number());
        assert!(!CustomFieldDefinition::new("city", "text").is_multi_valued());
    }
}
