//! Diagnostic event recording for randomized waits

use crate::storage::{EventStore, NewEvent, TrackedEvent};
use chrono::{Duration, NaiveDateTime};
use serde_json::json;
use tracing::{debug, warn};

pub const RANDOM_WAIT_EVENT_KEY: &str = "random_wait_time";
pub const RANDOM_WAIT_EVENT_TITLE: &str = "Randomized Wait Time";
pub const DEBUG_PROVIDER: &str = "debug";

/// Records each randomized delay as a tracked event on a fixed contact
pub struct WaitTimeRecorder<'a, S: ?Sized> {
    store: &'a S,
    email: &'a str,
}

impl<'a, S> WaitTimeRecorder<'a, S>
where
    S: EventStore + ?Sized,
{
    pub fn new(store: &'a S, email: &'a str) -> Self {
        Self { store, email }
    }

    /// Event payload for a delay scheduled at `now`.
    ///
    /// `None` when the next run falls outside the representable calendar.
    pub fn event_for(&self, delay_seconds: f64, now: NaiveDateTime) -> Option<NewEvent> {
        let next_run = Duration::try_seconds(delay_seconds as i64)
            .and_then(|offset| now.checked_add_signed(offset))?;
        let delay = if delay_seconds.fract() == 0.0 {
            json!(delay_seconds as i64)
        } else {
            json!(delay_seconds)
        };

        Some(NewEvent {
            event_key: RANDOM_WAIT_EVENT_KEY.to_string(),
            title: RANDOM_WAIT_EVENT_TITLE.to_string(),
            value: json!({
                "next_sequence": next_run.format("%Y-%m-%d %H:%M:%S").to_string(),
                "delay": delay,
            })
            .to_string(),
            email: self.email.to_string(),
            provider: DEBUG_PROVIDER.to_string(),
        })
    }

    /// Record the delay. Failures are logged and dropped.
    pub async fn record(&self, delay_seconds: f64, now: NaiveDateTime) -> Option<TrackedEvent> {
        if self.email.is_empty() {
            debug!("no tracker contact configured, skipping wait time event");
            return None;
        }

        let Some(event) = self.event_for(delay_seconds, now) else {
            warn!(delay_seconds, "next run out of calendar range, skipping wait time event");
            return None;
        };

        match self.store.track(event).await {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, delay_seconds, "failed to record randomized wait time");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryStore, Subscriber};
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_event_payload() {
        let store = InMemoryStore::new();
        let recorder = WaitTimeRecorder::new(&store, "ops@example.com");
        let event = recorder.event_for(7200.0, noon()).unwrap();

        assert_eq!(event.event_key, "random_wait_time");
        assert_eq!(event.provider, "debug");
        let value: serde_json::Value = serde_json::from_str(&event.value).unwrap();
        assert_eq!(value["next_sequence"], "2024-03-01 14:00:00");
        assert_eq!(value["delay"], 7200);
    }

    #[tokio::test]
    async fn test_record_skips_out_of_range_delay() {
        let store = InMemoryStore::new();
        store.add_subscriber(Subscriber::new(3, "ops@example.com")).await;
        let recorder = WaitTimeRecorder::new(&store, "ops@example.com");

        assert!(recorder.event_for(6.048e14, noon()).is_none());
        assert!(recorder.event_for(f64::MAX, noon()).is_none());
        assert!(recorder.record(6.048e14, noon()).await.is_none());
        assert!(store.all_events().await.is_empty());
    }

    #[tokio::test]
    async fn test_record_swallows_unknown_contact() {
        let store = InMemoryStore::new();
        let recorder = WaitTimeRecorder::new(&store, "nobody@example.com");
        assert!(recorder.record(60.0, noon()).await.is_none());
    }

    #[tokio::test]
    async fn test_record_tracks_event() {
        let store = InMemoryStore::new();
        store.add_subscriber(Subscriber::new(3, "ops@example.com")).await;
        let recorder = WaitTimeRecorder::new(&store, "ops@example.com");

        let event = recorder.record(90.5, noon()).await.unwrap();
        assert_eq!(event.subscriber_id, 3);
        assert!(event.value.contains("90.5"));
    }
}
