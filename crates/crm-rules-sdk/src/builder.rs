//! Builder pattern for Engine

use crate::config::EngineConfig;
use crate::engine::{Engine, NoSession};
use crate::error::{Result, SdkError};
use crate::handlers::FilterGroupHandler;
use crate::registry::HookRegistry;
use crm_rules_runtime::{AuthGateway, CrmStore, NoSmartCodes, SmartCodeParser};
use std::sync::Arc;

/// Builder for Engine
///
/// # Example
///
/// ```rust,ignore
/// use crm_rules_sdk::{EngineBuilder, EngineConfig};
/// use crm_rules_runtime::InMemoryStore;
/// use std::sync::Arc;
///
/// let engine = EngineBuilder::new()
///     .with_config(EngineConfig::load()?)
///     .with_store(Arc::new(InMemoryStore::new()))
///     .build()?;
/// ```
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn CrmStore>>,
    registry: HookRegistry,
    smart_codes: Arc<dyn SmartCodeParser>,
    auth: Arc<dyn AuthGateway>,
    #[cfg(feature = "sqlx")]
    predicate_runner: Option<crm_rules_runtime::sql::sqlite::SqlitePredicateRunner>,
}

impl EngineBuilder {
    /// Create a new builder with the standard hook registry
    pub fn new() -> Self {
        Self {
            config: EngineConfig::new(),
            store: None,
            registry: HookRegistry::standard(),
            smart_codes: Arc::new(NoSmartCodes),
            auth: Arc::new(NoSession),
            #[cfg(feature = "sqlx")]
            predicate_runner: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the data-access backend
    pub fn with_store(mut self, store: Arc<dyn CrmStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the handler of one filter group
    pub fn with_handler(mut self, handler: Arc<dyn FilterGroupHandler>) -> Self {
        self.registry = self.registry.register(handler);
        self
    }

    pub fn with_registry(mut self, registry: HookRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Placeholder expansion for smart link targets
    pub fn with_smart_codes(mut self, parser: Arc<dyn SmartCodeParser>) -> Self {
        self.smart_codes = parser;
        self
    }

    /// Site session used for smart link auto-login
    pub fn with_auth(mut self, auth: Arc<dyn AuthGateway>) -> Self {
        self.auth = auth;
        self
    }

    /// Execute filters directly against a SQLite database
    #[cfg(feature = "sqlx")]
    pub fn with_predicate_runner(
        mut self,
        runner: crm_rules_runtime::sql::sqlite::SqlitePredicateRunner,
    ) -> Self {
        tracing::info!("Configuring SQLite predicate runner");
        self.predicate_runner = Some(runner);
        self
    }

    /// Enable event tracking
    pub fn enable_event_tracking(mut self, enable: bool) -> Self {
        self.config.features.event_tracking = enable;
        self
    }

    /// Build the engine; a store is required
    pub fn build(self) -> Result<Engine> {
        let store = self.store.ok_or(SdkError::NotInitialized)?;

        #[cfg_attr(not(feature = "sqlx"), allow(unused_mut))]
        let mut engine = Engine::new(
            self.config,
            store,
            self.registry,
            self.smart_codes,
            self.auth,
        )?;

        #[cfg(feature = "sqlx")]
        {
            engine.predicate_runner = self.predicate_runner;
        }

        Ok(engine)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
