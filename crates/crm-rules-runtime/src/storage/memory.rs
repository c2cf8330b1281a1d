//! In-memory data store
//!
//! Backs every storage trait with maps guarded by a single `RwLock`.
//! Suitable for tests and embedding, data is lost when the process exits.

use super::{
    CommerceStore, ContactLink, ContactStore, CustomFieldDefinition, EventPage, EventStore,
    NewEvent, ReviewRecord, SmartLink, SmartLinkStore, Subscriber, SubscriptionRecord,
    TrackedEvent,
};
use crate::error::{Result, RuntimeError};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use crm_rules_core::{EventSample, Value};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    subscribers: HashMap<u64, Subscriber>,
    main_fields: HashMap<u64, HashMap<String, Value>>,
    links: Vec<ContactLink>,
    subscriptions: Vec<SubscriptionRecord>,
    reviews: Vec<ReviewRecord>,
    events: Vec<TrackedEvent>,
    field_definitions: Vec<CustomFieldDefinition>,
    custom_values: HashMap<u64, HashMap<String, Value>>,
    tags: HashMap<u64, BTreeSet<u64>>,
    lists: HashMap<u64, BTreeSet<u64>>,
    smart_links: Vec<SmartLink>,
    next_event_id: u64,
}

/// In-memory implementation of every storage trait
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_subscriber(&self, subscriber: Subscriber) {
        let mut state = self.state.write().await;
        state.subscribers.insert(subscriber.id, subscriber);
    }

    /// Link a contact to an external account
    pub async fn link_account(&self, subscriber_id: u64, provider: &str, provider_id: u64) {
        let mut state = self.state.write().await;
        state.links.retain(|l| !(l.subscriber_id == subscriber_id && l.provider == provider));
        state.links.push(ContactLink {
            subscriber_id,
            provider: provider.to_string(),
            provider_id,
        });
    }

    pub async fn add_subscription(&self, subscription: SubscriptionRecord) {
        self.state.write().await.subscriptions.push(subscription);
    }

    pub async fn add_review(&self, review: ReviewRecord) {
        self.state.write().await.reviews.push(review);
    }

    /// Insert a stored event as-is
    pub async fn add_event(&self, event: TrackedEvent) {
        let mut state = self.state.write().await;
        state.next_event_id = state.next_event_id.max(event.id);
        state.events.push(event);
    }

    pub async fn add_custom_field(&self, definition: CustomFieldDefinition) {
        let mut state = self.state.write().await;
        state.field_definitions.retain(|d| d.slug != definition.slug);
        state.field_definitions.push(definition);
    }

    pub async fn set_custom_value(&self, subscriber_id: u64, slug: &str, value: Value) {
        let mut state = self.state.write().await;
        state
            .custom_values
            .entry(subscriber_id)
            .or_default()
            .insert(slug.to_string(), value);
    }

    pub async fn add_smart_link(&self, link: SmartLink) {
        self.state.write().await.smart_links.push(link);
    }

    pub async fn custom_values_of(&self, subscriber_id: u64) -> HashMap<String, Value> {
        let state = self.state.read().await;
        state
            .custom_values
            .get(&subscriber_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn main_field(&self, subscriber_id: u64, key: &str) -> Option<Value> {
        let state = self.state.read().await;
        state
            .main_fields
            .get(&subscriber_id)
            .and_then(|fields| fields.get(key).cloned())
    }

    pub async fn tags_of(&self, subscriber_id: u64) -> Vec<u64> {
        let state = self.state.read().await;
        state
            .tags
            .get(&subscriber_id)
            .map(|t| t.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn lists_of(&self, subscriber_id: u64) -> Vec<u64> {
        let state = self.state.read().await;
        state
            .lists
            .get(&subscriber_id)
            .map(|l| l.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All stored events in insertion order
    pub async fn all_events(&self) -> Vec<TrackedEvent> {
        self.state.read().await.events.clone()
    }
}

fn newest_first(events: &mut [TrackedEvent]) {
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[async_trait]
impl CommerceStore for InMemoryStore {
    async fn linked_account(&self, subscriber_id: u64, provider: &str) -> Result<Option<u64>> {
        let state = self.state.read().await;
        Ok(state
            .links
            .iter()
            .find(|l| l.subscriber_id == subscriber_id && l.provider == provider)
            .map(|l| l.provider_id))
    }

    async fn subscriptions_for(&self, customer_id: u64) -> Result<Vec<SubscriptionRecord>> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .iter()
            .filter(|s| s.customer_id == customer_id)
            .cloned()
            .collect())
    }

    async fn reviews_by(&self, subscriber: &Subscriber) -> Result<Vec<ReviewRecord>> {
        let state = self.state.read().await;
        Ok(state
            .reviews
            .iter()
            .filter(|r| r.written_by(subscriber))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn events_for(
        &self,
        subscriber_id: u64,
        event_key: Option<&str>,
    ) -> Result<Vec<TrackedEvent>> {
        let state = self.state.read().await;
        let mut events: Vec<TrackedEvent> = state
            .events
            .iter()
            .filter(|e| e.subscriber_id == subscriber_id)
            .filter(|e| event_key.map_or(true, |key| e.event_key == key))
            .cloned()
            .collect();
        newest_first(&mut events);
        Ok(events)
    }

    async fn latest_per_key(&self) -> Result<Vec<EventSample>> {
        let state = self.state.read().await;
        let mut events = state.events.clone();
        newest_first(&mut events);

        let mut samples: Vec<EventSample> = Vec::new();
        for event in events {
            if samples.iter().any(|s| s.event_key == event.event_key) {
                continue;
            }
            samples.push(EventSample {
                event_key: event.event_key,
                title: event.title,
                value: event.value,
            });
        }
        samples.sort_by(|a, b| b.event_key.cmp(&a.event_key));
        Ok(samples)
    }

    async fn page_for_subscriber(
        &self,
        subscriber_id: u64,
        page: u64,
        per_page: u64,
    ) -> Result<EventPage> {
        if per_page == 0 {
            return Err(RuntimeError::InvalidValue("per_page must be positive".into()));
        }
        let page = page.max(1);

        let state = self.state.read().await;
        let mut events: Vec<TrackedEvent> = state
            .events
            .iter()
            .filter(|e| e.subscriber_id == subscriber_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));

        let total = events.len() as u64;
        let offset = usize::try_from((page - 1).saturating_mul(per_page)).unwrap_or(usize::MAX);
        let events = events
            .into_iter()
            .skip(offset)
            .take(usize::try_from(per_page).unwrap_or(usize::MAX))
            .collect();

        Ok(EventPage {
            events,
            total,
            per_page,
            current_page: page,
        })
    }

    async fn track(&self, event: NewEvent) -> Result<TrackedEvent> {
        let mut state = self.state.write().await;
        let subscriber_id = state
            .subscribers
            .values()
            .find(|s| s.email == event.email)
            .map(|s| s.id)
            .ok_or_else(|| RuntimeError::NotFound(format!("contact {}", event.email)))?;

        state.next_event_id += 1;
        let timestamp = now();
        let stored = TrackedEvent {
            id: state.next_event_id,
            subscriber_id,
            event_key: event.event_key,
            title: event.title,
            value: event.value,
            provider: event.provider,
            counter: 1,
            created_at: timestamp,
            updated_at: timestamp,
        };
        state.events.push(stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl ContactStore for InMemoryStore {
    async fn subscriber(&self, subscriber_id: u64) -> Result<Option<Subscriber>> {
        Ok(self.state.read().await.subscribers.get(&subscriber_id).cloned())
    }

    async fn custom_field_definitions(&self) -> Result<Vec<CustomFieldDefinition>> {
        Ok(self.state.read().await.field_definitions.clone())
    }

    async fn custom_field_value(&self, subscriber_id: u64, slug: &str) -> Result<Option<Value>> {
        let state = self.state.read().await;
        Ok(state
            .custom_values
            .get(&subscriber_id)
            .and_then(|values| values.get(slug).cloned()))
    }

    async fn sync_custom_fields(
        &self,
        subscriber_id: u64,
        values: HashMap<String, Value>,
    ) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        if !state.subscribers.contains_key(&subscriber_id) {
            return Err(RuntimeError::NotFound(format!("subscriber {}", subscriber_id)));
        }

        let current = state.custom_values.entry(subscriber_id).or_default();
        let mut changed = Vec::new();
        for (slug, value) in values {
            if current.get(&slug) != Some(&value) {
                current.insert(slug.clone(), value);
                changed.push(slug);
            }
        }
        changed.sort();
        Ok(changed)
    }

    async fn update_main_fields(
        &self,
        subscriber_id: u64,
        values: HashMap<String, Value>,
    ) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        let subscriber = state
            .subscribers
            .get_mut(&subscriber_id)
            .ok_or_else(|| RuntimeError::NotFound(format!("subscriber {}", subscriber_id)))?;

        if let Some(Value::String(email)) = values.get("email") {
            subscriber.email = email.clone();
        }

        let current = state.main_fields.entry(subscriber_id).or_default();
        let mut changed = Vec::new();
        for (key, value) in values {
            if current.get(&key) != Some(&value) {
                current.insert(key.clone(), value);
                changed.push(key);
            }
        }
        changed.sort();
        Ok(changed)
    }

    async fn attach_tags(&self, subscriber_id: u64, tag_ids: &[u64]) -> Result<()> {
        let mut state = self.state.write().await;
        state.tags.entry(subscriber_id).or_default().extend(tag_ids);
        Ok(())
    }

    async fn detach_tags(&self, subscriber_id: u64, tag_ids: &[u64]) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(tags) = state.tags.get_mut(&subscriber_id) {
            tags.retain(|t| !tag_ids.contains(t));
        }
        Ok(())
    }

    async fn attach_lists(&self, subscriber_id: u64, list_ids: &[u64]) -> Result<()> {
        let mut state = self.state.write().await;
        state.lists.entry(subscriber_id).or_default().extend(list_ids);
        Ok(())
    }

    async fn detach_lists(&self, subscriber_id: u64, list_ids: &[u64]) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(lists) = state.lists.get_mut(&subscriber_id) {
            lists.retain(|l| !list_ids.contains(l));
        }
        Ok(())
    }
}

#[async_trait]
impl SmartLinkStore for InMemoryStore {
    async fn smart_link(&self, slug: &str) -> Result<Option<SmartLink>> {
        let state = self.state.read().await;
        Ok(state.smart_links.iter().find(|l| l.slug == slug).cloned())
    }

    async fn record_click(&self, link_id: u64, by_contact: bool) -> Result<SmartLink> {
        let mut state = self.state.write().await;
        let link = state
            .smart_links
            .iter_mut()
            .find(|l| l.id == link_id)
            .ok_or_else(|| RuntimeError::NotFound(format!("smart link {}", link_id)))?;

        if by_contact {
            link.contact_clicks += 1;
        }
        link.all_clicks += 1;
        Ok(link.clone())
    }
}
