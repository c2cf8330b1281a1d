//! Configuration types for the Engine

use crate::error::{Result, SdkError};
use crm_rules_runtime::webhook::DEFAULT_WEBHOOK_ID;
use crm_rules_runtime::SqlDialect;
use serde::{Deserialize, Serialize};

/// Main engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Host capabilities
    #[serde(default)]
    pub features: FeatureFlags,

    /// SQL rendering options
    #[serde(default)]
    pub sql: SqlConfig,

    /// Incoming webhook remapping
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Events per page in the contact widget
    #[serde(default = "default_widget_page_size")]
    pub widget_page_size: u64,

    /// Contact that receives randomized wait time events; empty disables them
    #[serde(default)]
    pub tracker_email: String,

    /// Log filter used by `init_tracing` when `RUST_LOG` is unset
    #[serde(default)]
    pub log_filter: Option<String>,
}

fn default_widget_page_size() -> u64 {
    15
}

impl EngineConfig {
    /// Create a new engine configuration
    pub fn new() -> Self {
        Self {
            features: FeatureFlags::default(),
            sql: SqlConfig::default(),
            webhook: WebhookConfig::default(),
            widget_page_size: default_widget_page_size(),
            tracker_email: String::new(),
            log_filter: None,
        }
    }

    /// Load configuration from `.env`, an optional `config/crm-rules` file
    /// and `CRM_RULES_*` environment variables (`__` separates nesting)
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_result = config::Config::builder()
            .add_source(config::File::with_name("config/crm-rules").required(false))
            .add_source(config::Environment::with_prefix("CRM_RULES").separator("__"))
            .build();

        match config_result {
            Ok(cfg) => cfg
                .try_deserialize()
                .map_err(|e| SdkError::ConfigError(format!("Failed to deserialize config: {}", e))),
            Err(e) => {
                tracing::info!(error = %e, "No usable config source, using default configuration");
                Ok(Self::default())
            }
        }
    }

    /// Parse inline YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn with_features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Enable the event tracking feature
    pub fn with_event_tracking(mut self, enabled: bool) -> Self {
        self.features.event_tracking = enabled;
        self
    }

    pub fn with_sql_dialect(mut self, dialect: SqlDialect) -> Self {
        self.sql.dialect = dialect;
        self
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sql.table_prefix = prefix.into();
        self
    }

    pub fn with_webhook_id(mut self, webhook_id: u64) -> Self {
        self.webhook.webhook_id = webhook_id;
        self
    }

    pub fn with_tracker_email(mut self, email: impl Into<String>) -> Self {
        self.tracker_email = email.into();
        self
    }

    pub fn with_widget_page_size(mut self, per_page: u64) -> Self {
        self.widget_page_size = per_page;
        self
    }

    /// Check values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.widget_page_size == 0 {
            return Err(SdkError::ConfigError(
                "widget_page_size must be positive".to_string(),
            ));
        }
        if self
            .sql
            .table_prefix
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '_'))
        {
            return Err(SdkError::ConfigError(format!(
                "invalid table prefix: {}",
                self.sql.table_prefix
            )));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Host capabilities. A disabled capability turns its filters into no-ops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Experimental event tracking
    #[serde(default)]
    pub event_tracking: bool,

    /// Commerce plugin present
    #[serde(default = "enabled")]
    pub commerce_enabled: bool,

    /// Recurring subscriptions add-on present
    #[serde(default = "enabled")]
    pub recurring_subscriptions: bool,

    /// Product reviews add-on present
    #[serde(default = "enabled")]
    pub reviews: bool,
}

fn enabled() -> bool {
    true
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            event_tracking: false,
            commerce_enabled: true,
            recurring_subscriptions: true,
            reviews: true,
        }
    }
}

/// SQL rendering options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlConfig {
    #[serde(default)]
    pub dialect: SqlDialect,

    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
}

fn default_table_prefix() -> String {
    "wp_".to_string()
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            dialect: SqlDialect::default(),
            table_prefix: default_table_prefix(),
        }
    }
}

/// Incoming webhook remapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook whose payload is remapped
    #[serde(default = "default_webhook_id")]
    pub webhook_id: u64,

    /// Hosts whose login URLs may be corrected; empty allows any
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

fn default_webhook_id() -> u64 {
    DEFAULT_WEBHOOK_ID
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            webhook_id: default_webhook_id(),
            allowed_hosts: Vec::new(),
        }
    }
}
