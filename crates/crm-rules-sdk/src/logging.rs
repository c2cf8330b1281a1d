//! Tracing subscriber setup

use crate::error::{Result, SdkError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor a configured filter is set
pub const DEFAULT_FILTER: &str = "crm_rules_sdk=info,crm_rules_runtime=info";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `filter`. Fails if a global subscriber is already set.
pub fn init_tracing(filter: Option<&str>) -> Result<()> {
    let fallback = filter.unwrap_or(DEFAULT_FILTER).to_string();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| SdkError::ConfigError(format!("Failed to initialize tracing: {}", e)))
}
