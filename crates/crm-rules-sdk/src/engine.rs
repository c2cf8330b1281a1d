//! Engine facade
//!
//! One method per host hook point. The engine owns the configuration, the
//! data-access backend and the hook registry; it holds no per-request state.

use crate::config::EngineConfig;
use crate::error::{Result, SdkError};
use crate::handlers::HookContext;
use crate::registry::{FilterGroup, HookPoint, HookRegistry};
use async_trait::async_trait;
use chrono::Local;
use crm_rules_core::{
    discover_properties, ComparisonMode, FilterClause, FilterOutcome, PropertyOption, SkipReason,
};
use crm_rules_runtime::actions::update_property::ACTION_NAME;
use crm_rules_runtime::{
    prepare_sequence, ActionOutcome, AuthGateway, ClickOutcome, CrmStore, DelayDecision,
    DelayRandomizer, DelaySettings, EventWidget, NewEvent, PropertyAssignment, SmartCodeParser,
    SmartLinkHandler, SqlFragment, SqlRenderer, Subscriber, TrackedEvent, UpdatePropertyAction,
    UserAccount, WaitSequence, WaitTimeRecorder, WebhookRemapper,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use tracing::{debug, info};

/// A filter clause compiled for a contact query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactFilter {
    pub outcome: FilterOutcome,
    /// Rendered `WHERE` fragment, absent when the clause is skipped
    pub sql: Option<SqlFragment>,
}

/// Result of ingesting a tracked event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTrackedOutcome {
    pub event: TrackedEvent,
    /// Whether the event-tracking conditions hold for the latest event
    pub conditions_met: bool,
}

/// Auth gateway for engines without a site session; never logs anyone in
pub struct NoSession;

#[async_trait]
impl AuthGateway for NoSession {
    async fn is_logged_in(&self) -> bool {
        false
    }

    async fn user_by_email(&self, _email: &str) -> Option<UserAccount> {
        None
    }

    async fn login_allowed(&self, _contact: &Subscriber) -> bool {
        false
    }

    async fn high_level_allowed(&self, _contact: &Subscriber) -> bool {
        false
    }

    async fn current_contact_id(&self) -> Option<u64> {
        None
    }

    async fn sign_on(&self, _user: &UserAccount) -> bool {
        false
    }
}

pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn CrmStore>,
    registry: HookRegistry,
    renderer: SqlRenderer,
    webhook: WebhookRemapper,
    smart_codes: Arc<dyn SmartCodeParser>,
    auth: Arc<dyn AuthGateway>,
    #[cfg(feature = "sqlx")]
    pub(crate) predicate_runner: Option<crm_rules_runtime::sql::sqlite::SqlitePredicateRunner>,
}

impl Engine {
    pub(crate) fn new(
        config: EngineConfig,
        store: Arc<dyn CrmStore>,
        registry: HookRegistry,
        smart_codes: Arc<dyn SmartCodeParser>,
        auth: Arc<dyn AuthGateway>,
    ) -> Result<Self> {
        config.validate()?;

        let renderer = SqlRenderer::new(config.sql.dialect, config.sql.table_prefix.clone());
        let webhook = WebhookRemapper::new(
            config.webhook.webhook_id,
            config.webhook.allowed_hosts.clone(),
        )?;

        info!(
            hooks = registry.hook_points().len(),
            dialect = ?config.sql.dialect,
            event_tracking = config.features.event_tracking,
            "CRM rules engine ready"
        );

        Ok(Self {
            config,
            store,
            registry,
            renderer,
            webhook,
            smart_codes,
            auth,
            #[cfg(feature = "sqlx")]
            predicate_runner: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CrmStore> {
        &self.store
    }

    pub fn registry(&self) -> &HookRegistry {
        &self.registry
    }

    pub fn supports(&self, hook: HookPoint) -> bool {
        self.registry.supports(hook)
    }

    // ========== Workflow ==========

    /// Resolve the delay of a wait step.
    ///
    /// `previous` is the delay the host computed; when the randomized delay
    /// differs, a diagnostic event is recorded on the tracker contact.
    pub async fn resolve_delay(&self, settings: &DelaySettings, previous: f64) -> DelayDecision {
        let decision = DelayRandomizer::new(rand::thread_rng()).resolve(settings, previous);

        if decision.changed {
            debug!(
                seconds = decision.seconds,
                previous, "randomized wait time differs from scheduled delay"
            );
            WaitTimeRecorder::new(self.store.as_ref(), &self.config.tracker_email)
                .record(decision.seconds, Local::now().naive_local())
                .await;
        }
        decision
    }

    /// Normalize a wait step before it is saved
    pub fn save_sequence(&self, sequence: WaitSequence) -> WaitSequence {
        prepare_sequence(sequence)
    }

    /// Run a workflow action by name
    pub async fn run_action(
        &self,
        action: &str,
        subscriber_id: u64,
        assignments: &[PropertyAssignment],
    ) -> Result<ActionOutcome> {
        if action != ACTION_NAME {
            return Err(SdkError::UnhandledHook(format!(
                "{}:{}",
                HookPoint::WorkflowActionHandler,
                action
            )));
        }
        Ok(UpdatePropertyAction::new(self.store.as_ref())
            .run(subscriber_id, assignments)
            .await?)
    }

    // ========== Filters and conditions ==========

    /// Compile a contact-filter clause and render it for the configured dialect
    pub fn filter_contacts(&self, clause: &FilterClause) -> Result<ContactFilter> {
        let Some(group) = FilterGroup::for_property(&clause.property) else {
            return Ok(ContactFilter {
                outcome: FilterOutcome::Skip(SkipReason::NotApplicable),
                sql: None,
            });
        };

        let outcome = self
            .registry
            .handler(group)?
            .filter(clause, &self.config.features)?;
        let sql = match outcome.predicate() {
            Some(predicate) => Some(self.renderer.render(predicate)?),
            None => None,
        };
        Ok(ContactFilter { outcome, sql })
    }

    /// Whether the contact passes a group's automation conditions
    pub async fn assess_conditions(
        &self,
        group: FilterGroup,
        prior: bool,
        conditions: &[FilterClause],
        subject: &Subscriber,
    ) -> Result<bool> {
        self.assess_in_mode(group, prior, conditions, subject, ComparisonMode::AnyEvent)
            .await
    }

    async fn assess_in_mode(
        &self,
        group: FilterGroup,
        prior: bool,
        conditions: &[FilterClause],
        subject: &Subscriber,
        mode: ComparisonMode,
    ) -> Result<bool> {
        let ctx = HookContext {
            store: self.store.as_ref(),
            features: &self.config.features,
            mode,
        };
        self.registry
            .handler(group)?
            .assess(&ctx, prior, conditions, subject)
            .await
    }

    /// Contacts matching a filter clause, read through the SQLite runner
    #[cfg(feature = "sqlx")]
    pub async fn matching_contacts(&self, clause: &FilterClause) -> Result<Option<Vec<u64>>> {
        let runner = self
            .predicate_runner
            .as_ref()
            .ok_or(SdkError::NotInitialized)?;
        let filter = self.filter_contacts(clause)?;
        match filter.outcome.predicate() {
            Some(predicate) => Ok(Some(runner.matching_contacts(predicate).await?)),
            None => Ok(None),
        }
    }

    // ========== Event tracking ==========

    /// Record an event, then assess event conditions against the newest event
    pub async fn event_tracked(
        &self,
        event: NewEvent,
        conditions: &[FilterClause],
    ) -> Result<EventTrackedOutcome> {
        let event = self.store.track(event).await?;
        let subject = self
            .store
            .subscriber(event.subscriber_id)
            .await?
            .ok_or_else(|| {
                crm_rules_runtime::RuntimeError::NotFound(format!(
                    "subscriber {}",
                    event.subscriber_id
                ))
            })?;

        let conditions_met = self
            .assess_in_mode(
                FilterGroup::EventTracking,
                true,
                conditions,
                &subject,
                ComparisonMode::Latest,
            )
            .await?;
        Ok(EventTrackedOutcome {
            event,
            conditions_met,
        })
    }

    /// Events widget for the contact profile; `None` when disabled or empty
    pub async fn subscriber_widget(&self, subscriber_id: u64, page: u64) -> Result<Option<EventWidget>> {
        if !self.config.features.event_tracking {
            return Ok(None);
        }
        Ok(crm_rules_runtime::event_widget(
            self.store.as_ref(),
            subscriber_id,
            page.max(1),
            self.config.widget_page_size,
        )
        .await?)
    }

    /// Selectable event properties for the filter editor
    pub async fn property_options(&self) -> Result<Vec<PropertyOption>> {
        if !self.config.features.event_tracking {
            return Ok(Vec::new());
        }
        let samples = self.store.latest_per_key().await?;
        Ok(discover_properties(&samples))
    }

    // ========== Inbound ==========

    pub fn incoming_webhook(
        &self,
        webhook_id: u64,
        payload: Map<String, JsonValue>,
    ) -> Map<String, JsonValue> {
        self.webhook.remap(webhook_id, payload)
    }

    /// Handle a smart link click; `None` for an unknown slug
    pub async fn smart_link_clicked(
        &self,
        slug: &str,
        contact: Option<Subscriber>,
        query: &[(String, String)],
    ) -> Result<Option<ClickOutcome>> {
        let handler = SmartLinkHandler::new(
            self.store.as_ref(),
            self.smart_codes.as_ref(),
            self.auth.as_ref(),
        );
        Ok(handler.handle_click(slug, contact, query).await?)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
