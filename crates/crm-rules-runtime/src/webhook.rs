//! Incoming webhook payload remapping
//!
//! One configured webhook delivers demo-site provisioning data whose keys do
//! not match the contact's custom fields. The payload is extended with the
//! `demo_*` fields the contact mapping expects.

use crate::error::{Result, RuntimeError};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use tracing::debug;

pub const DEFAULT_WEBHOOK_ID: u64 = 61;

const CREATED_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %I:%M %p",
    "%Y-%m-%d %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%B %d, %Y %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y"];

pub struct WebhookRemapper {
    webhook_id: u64,
    allowed_hosts: Vec<String>,
    broken_login_url: Regex,
    html_tag: Regex,
    octet: Regex,
    entity: Regex,
}

impl WebhookRemapper {
    /// `allowed_hosts` limits URL correction to those hosts; empty allows any
    pub fn new(webhook_id: u64, allowed_hosts: Vec<String>) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| RuntimeError::InvalidValue(e.to_string()))
        };
        Ok(Self {
            webhook_id,
            allowed_hosts,
            broken_login_url: compile(r"^https://([^/?#]+)\?site=([^&/]+)(/[^&?]*)&redir=/$")?,
            html_tag: compile(r"<[^>]*>")?,
            octet: compile(r"%[a-fA-F0-9]{2}")?,
            entity: compile(r"&.+?;")?,
        })
    }

    pub fn webhook_id(&self) -> u64 {
        self.webhook_id
    }

    /// Add the `demo_*` fields for the configured webhook; others pass through
    pub fn remap(&self, webhook_id: u64, mut payload: Map<String, JsonValue>) -> Map<String, JsonValue> {
        if webhook_id != self.webhook_id {
            return payload;
        }

        let field = |key: &str| payload.get(key).and_then(scalar_text);

        let magic_login = field("magic_login")
            .map(|url| self.correct_login_url(&url))
            .unwrap_or_default();
        let site_admin = field("site_admin")
            .map(|user| self.sanitize_user(&user))
            .unwrap_or_default();
        let site_password = field("site_password")
            .map(|key| sanitize_key(&key))
            .unwrap_or_default();
        let site_url = field("site_url").unwrap_or_default();
        let template = field("template_slug")
            .map(|key| sanitize_key(&key))
            .unwrap_or_default();
        let created = field("created_date")
            .map(|date| {
                let time = field("created_time").unwrap_or_default();
                format_created(&date, &time)
            })
            .unwrap_or_default();

        debug!(webhook_id, "remapping webhook payload");

        for (key, value) in [
            ("demo_magic_login_url", magic_login),
            ("demo_site_admin", site_admin),
            ("demo_site_password", site_password),
            ("demo_site_url", site_url),
            ("demo_site_template", template),
            ("demo_site_created", created),
        ] {
            payload.insert(key.to_string(), JsonValue::String(value));
        }
        payload
    }

    /// Repair `https://<host>?site=<X>/<path>&redir=/` into
    /// `https://<host>/<path>?site=<X>&redir=/`; anything else is returned as is
    pub fn correct_login_url(&self, url: &str) -> String {
        let Some(caps) = self.broken_login_url.captures(url) else {
            return url.to_string();
        };
        let host = &caps[1];
        if !self.allowed_hosts.is_empty() && !self.allowed_hosts.iter().any(|h| h == host) {
            return url.to_string();
        }
        format!("https://{}{}?site={}&redir=/", host, &caps[3], &caps[2])
    }

    /// Username sanitizing: strips markup, octets and entities, keeps
    /// `[A-Za-z0-9 _.-@]`, collapses whitespace
    pub fn sanitize_user(&self, raw: &str) -> String {
        let stripped = self.html_tag.replace_all(raw, "");
        let stripped = self.octet.replace_all(&stripped, "");
        let stripped = self.entity.replace_all(&stripped, "");
        let kept: String = stripped
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '-' | '@'))
            .collect();
        kept.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Lowercase, keeping `[a-z0-9_-]`
pub fn sanitize_key(raw: &str) -> String {
    raw.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'))
        .collect()
}

/// Join date and time into `%Y-%m-%d %H:%M:%S`; empty when unparsable
pub fn format_created(date: &str, time: &str) -> String {
    let combined = format!("{} {}", date.trim(), time.trim());
    let combined = combined.trim();

    let parsed = CREATED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(combined, fmt).ok())
        .or_else(|| {
            DATE_FORMATS.iter().find_map(|fmt| {
                NaiveDate::parse_from_str(combined, fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
        })
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(combined)
                .ok()
                .map(|dt| dt.naive_utc())
        });

    match parsed {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => {
            debug!(date, time, "unparsable webhook creation date");
            String::new()
        }
    }
}

/// Present, non-null scalar as text
fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Bool(b) => Some(if *b { "1".to_string() } else { String::new() }),
        JsonValue::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}
