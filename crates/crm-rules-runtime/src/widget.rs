//! Contact profile widget listing tracked events

use crate::error::Result;
use crate::storage::EventStore;
use chrono::NaiveDateTime;
use crm_rules_core::event::decode_object;
use serde::{Deserialize, Serialize};

pub const WIDGET_KEY: &str = "event_tracking_json";
pub const WIDGET_TITLE: &str = "Event Tracking (JSON)";

/// One event row; object values are split into properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    pub event_key: String,
    pub title: String,
    pub counter: u32,
    /// Raw value when it is not a JSON object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_value: Option<String>,
    /// `(name, text)` pairs of an object value
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<(String, String)>,
    pub updated_at: NaiveDateTime,
}

/// Widget payload for one page of events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventWidget {
    pub title: String,
    pub entries: Vec<EventEntry>,
    pub has_pagination: bool,
    pub total: u64,
    pub per_page: u64,
    pub current_page: u64,
}

/// Build the widget, `None` when the contact has no events on that page
pub async fn event_widget<S>(
    store: &S,
    subscriber_id: u64,
    page: u64,
    per_page: u64,
) -> Result<Option<EventWidget>>
where
    S: EventStore + ?Sized,
{
    let page = store.page_for_subscriber(subscriber_id, page, per_page).await?;
    if page.events.is_empty() {
        return Ok(None);
    }

    let entries = page
        .events
        .into_iter()
        .map(|event| {
            let (raw_value, properties) = if event.value.is_empty() {
                (None, Vec::new())
            } else {
                match decode_object(&event.value) {
                    Some(object) => (
                        None,
                        object
                            .into_iter()
                            .map(|(k, v)| {
                                let text = match v {
                                    serde_json::Value::String(s) => s,
                                    other => other.to_string(),
                                };
                                (k, text)
                            })
                            .collect(),
                    ),
                    None => (Some(event.value.clone()), Vec::new()),
                }
            };
            EventEntry {
                event_key: event.event_key,
                title: event.title,
                counter: event.counter,
                raw_value,
                properties,
                updated_at: event.updated_at,
            }
        })
        .collect();

    Ok(Some(EventWidget {
        title: WIDGET_TITLE.to_string(),
        entries,
        has_pagination: page.total > page.per_page,
        total: page.total,
        per_page: page.per_page,
        current_page: page.current_page,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStore, TrackedEvent};
    use chrono::NaiveDate;

    fn event(id: u64, value: &str) -> TrackedEvent {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(id as u32, 0, 0)
            .unwrap();
        TrackedEvent {
            id,
            subscriber_id: 1,
            event_key: "purchase".into(),
            title: "Purchase".into(),
            value: value.into(),
            provider: "custom".into(),
            counter: 1,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_widget_splits_objects() {
        let store = InMemoryStore::new();
        store.add_event(event(1, r#"{"amount": 12}"#)).await;
        store.add_event(event(2, "plain text")).await;

        let widget = event_widget(&store, 1, 1, 10).await.unwrap().unwrap();
        assert_eq!(widget.entries.len(), 2);
        assert_eq!(widget.entries[0].raw_value.as_deref(), Some("plain text"));
        assert_eq!(
            widget.entries[1].properties,
            vec![("amount".to_string(), "12".to_string())]
        );
        assert!(!widget.has_pagination);
    }

    #[tokio::test]
    async fn test_widget_pagination_and_empty() {
        let store = InMemoryStore::new();
        for id in 1..=3 {
            store.add_event(event(id, "")).await;
        }
        let widget = event_widget(&store, 1, 2, 2).await.unwrap().unwrap();
        assert!(widget.has_pagination);
        assert_eq!(widget.entries.len(), 1);
        assert_eq!(widget.total, 3);

        assert!(event_widget(&store, 2, 1, 10).await.unwrap().is_none());
    }
}
