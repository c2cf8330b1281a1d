//! Typed hook registry
//!
//! Host hook names are modelled as [`HookPoint`] values. Filter and condition
//! hooks are grouped; each [`FilterGroup`] resolves to one handler when the
//! engine is built, so dispatch never looks up strings at request time.

use crate::error::{Result, SdkError};
use crate::handlers::{EddProHandler, EventTrackingHandler, FilterGroupHandler};
use crm_rules_core::RelationKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Filter and condition group a property belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterGroup {
    EddPro,
    EventTracking,
}

impl FilterGroup {
    pub const ALL: [FilterGroup; 2] = [FilterGroup::EddPro, FilterGroup::EventTracking];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterGroup::EddPro => "edd_pro",
            FilterGroup::EventTracking => "event_tracking",
        }
    }

    pub fn for_relation(relation: RelationKind) -> Self {
        match relation {
            RelationKind::ActiveSubscription | RelationKind::LeftReview => FilterGroup::EddPro,
            RelationKind::EventJsonProperty => FilterGroup::EventTracking,
        }
    }

    /// Group answering for a host property key
    pub fn for_property(property: &str) -> Option<Self> {
        RelationKind::from_property_key(property).map(Self::for_relation)
    }
}

impl std::fmt::Display for FilterGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host extension points the engine answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "hook", content = "group", rename_all = "snake_case")]
pub enum HookPoint {
    WorkflowDelayResolution,
    WorkflowSequenceSave,
    WorkflowActionHandler,
    ContactFilter(FilterGroup),
    AutomationConditionAssessor(FilterGroup),
    EventTracked,
    SubscriberInfoWidget,
    AjaxOptionLookup,
    IncomingWebhookPayload,
    SmartLinkClicked,
}

impl HookPoint {
    /// Hooks that do not depend on a filter group
    pub const FIXED: [HookPoint; 8] = [
        HookPoint::WorkflowDelayResolution,
        HookPoint::WorkflowSequenceSave,
        HookPoint::WorkflowActionHandler,
        HookPoint::EventTracked,
        HookPoint::SubscriberInfoWidget,
        HookPoint::AjaxOptionLookup,
        HookPoint::IncomingWebhookPayload,
        HookPoint::SmartLinkClicked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::WorkflowDelayResolution => "workflow_delay_resolution",
            HookPoint::WorkflowSequenceSave => "workflow_sequence_save",
            HookPoint::WorkflowActionHandler => "workflow_action_handler",
            HookPoint::ContactFilter(_) => "contact_filter",
            HookPoint::AutomationConditionAssessor(_) => "automation_condition_assessor",
            HookPoint::EventTracked => "event_tracked",
            HookPoint::SubscriberInfoWidget => "subscriber_info_widget",
            HookPoint::AjaxOptionLookup => "ajax_option_lookup",
            HookPoint::IncomingWebhookPayload => "incoming_webhook_payload",
            HookPoint::SmartLinkClicked => "smart_link_clicked",
        }
    }

    pub fn group(&self) -> Option<FilterGroup> {
        match self {
            HookPoint::ContactFilter(group) | HookPoint::AutomationConditionAssessor(group) => {
                Some(*group)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.group() {
            Some(group) => write!(f, "{}:{}", self.as_str(), group),
            None => f.write_str(self.as_str()),
        }
    }
}

/// Filter group handlers keyed by group
#[derive(Clone, Default)]
pub struct HookRegistry {
    handlers: HashMap<FilterGroup, Arc<dyn FilterGroupHandler>>,
}

impl HookRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handler for every group
    pub fn standard() -> Self {
        Self::new()
            .register(Arc::new(EddProHandler::new()))
            .register(Arc::new(EventTrackingHandler::new()))
    }

    /// Register a handler; it replaces any handler of the same group
    pub fn register(mut self, handler: Arc<dyn FilterGroupHandler>) -> Self {
        self.handlers.insert(handler.group(), handler);
        self
    }

    pub fn handler(&self, group: FilterGroup) -> Result<&Arc<dyn FilterGroupHandler>> {
        self.handlers
            .get(&group)
            .ok_or_else(|| SdkError::UnhandledHook(HookPoint::ContactFilter(group).to_string()))
    }

    pub fn supports(&self, hook: HookPoint) -> bool {
        match hook.group() {
            Some(group) => self.handlers.contains_key(&group),
            None => true,
        }
    }

    /// Every hook point answered by this registry
    pub fn hook_points(&self) -> Vec<HookPoint> {
        let mut hooks = HookPoint::FIXED.to_vec();
        for group in FilterGroup::ALL {
            if self.handlers.contains_key(&group) {
                hooks.push(HookPoint::ContactFilter(group));
                hooks.push(HookPoint::AutomationConditionAssessor(group));
            }
        }
        hooks
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut groups: Vec<&str> = self.handlers.keys().map(FilterGroup::as_str).collect();
        groups.sort_unstable();
        f.debug_struct("HookRegistry").field("groups", &groups).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_for_property() {
        assert_eq!(
            FilterGroup::for_property("edd_pro_active_subscription"),
            Some(FilterGroup::EddPro)
        );
        assert_eq!(
            FilterGroup::for_property("edd_pro_has_left_review"),
            Some(FilterGroup::EddPro)
        );
        assert_eq!(
            FilterGroup::for_property("event_tracking_object_prop"),
            Some(FilterGroup::EventTracking)
        );
        assert_eq!(FilterGroup::for_property("first_name"), None);
    }

    #[test]
    fn test_hook_point_display() {
        assert_eq!(HookPoint::SmartLinkClicked.to_string(), "smart_link_clicked");
        assert_eq!(
            HookPoint::ContactFilter(FilterGroup::EddPro).to_string(),
            "contact_filter:edd_pro"
        );
    }

    #[test]
    fn test_standard_registry() {
        let registry = HookRegistry::standard();
        assert!(registry.handler(FilterGroup::EddPro).is_ok());
        assert!(registry.handler(FilterGroup::EventTracking).is_ok());
        assert_eq!(registry.hook_points().len(), 12);
    }

    #[test]
    fn test_empty_registry() {
        let registry = HookRegistry::new();
        assert!(registry.supports(HookPoint::EventTracked));
        assert!(!registry.supports(HookPoint::AutomationConditionAssessor(
            FilterGroup::EventTracking
        )));

        let err = registry.handler(FilterGroup::EddPro).err().unwrap();
        assert!(matches!(err, SdkError::UnhandledHook(_)));
    }
}
