//! Selector types for multi-select filter options

use crate::types::Value;
use serde::{Deserialize, Serialize};

/// A parsed option token
///
/// `SimpleEntity` is a product without variants (token variant `0`), which is
/// distinct from `EntireEntity` ("all variants of the product").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Any record of the relation
    Any,
    /// Every variant of a product (`"42-all"`)
    EntireEntity(u64),
    /// A product sold without variants (`"42-0"`)
    SimpleEntity(u64),
    /// One variant of a product (`"42-7"`)
    EntityVariant(u64, u64),
}

impl Selector {
    pub fn is_any(&self) -> bool {
        matches!(self, Selector::Any)
    }

    /// Product id the selector refers to, `None` for `Any`
    pub fn entity_id(&self) -> Option<u64> {
        match self {
            Selector::Any => None,
            Selector::EntireEntity(id)
            | Selector::SimpleEntity(id)
            | Selector::EntityVariant(id, _) => Some(*id),
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Any => write!(f, "any"),
            Selector::EntireEntity(id) => write!(f, "{}-all", id),
            Selector::SimpleEntity(id) => write!(f, "{}-0", id),
            Selector::EntityVariant(id, variant) => write!(f, "{}-{}", id, variant),
        }
    }
}

/// Filter polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FilterOperator {
    /// Subject must match (`in`)
    #[default]
    #[serde(rename = "in")]
    Include,
    /// Subject must not match (`not_in`)
    #[serde(rename = "not_in")]
    Exclude,
}

impl FilterOperator {
    /// Map the operator string posted by the host.
    ///
    /// A missing operator or `in` includes; every other string excludes.
    pub fn from_host(op: Option<&str>) -> Self {
        match op.map(str::trim) {
            None | Some("") | Some("in") => FilterOperator::Include,
            Some(_) => FilterOperator::Exclude,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Include => "in",
            FilterOperator::Exclude => "not_in",
        }
    }
}

/// Which external fact a filter checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Active commerce subscription for a product
    ActiveSubscription,
    /// Approved product review written by the contact
    LeftReview,
    /// Scalar inside the JSON value of a tracked event
    EventJsonProperty,
}

impl RelationKind {
    pub const ALL: [RelationKind; 3] = [
        RelationKind::ActiveSubscription,
        RelationKind::LeftReview,
        RelationKind::EventJsonProperty,
    ];

    /// Property key the host uses for this relation in filter and condition payloads
    pub fn property_key(&self) -> &'static str {
        match self {
            RelationKind::ActiveSubscription => "edd_pro_active_subscription",
            RelationKind::LeftReview => "edd_pro_has_left_review",
            RelationKind::EventJsonProperty => "event_tracking_json_prop",
        }
    }

    /// Resolve a host property key
    pub fn from_property_key(key: &str) -> Option<Self> {
        match key {
            "edd_pro_active_subscription" => Some(RelationKind::ActiveSubscription),
            "edd_pro_has_left_review" => Some(RelationKind::LeftReview),
            "event_tracking_json_prop" | "event_tracking_object_prop" => {
                Some(RelationKind::EventJsonProperty)
            }
            _ => None,
        }
    }

    /// External account provider the relation is linked through.
    ///
    /// Subscriptions hang off a commerce customer that is linked to the
    /// contact; reviews and events are keyed on the contact identity directly.
    pub fn link_provider(&self) -> Option<&'static str> {
        match self {
            RelationKind::ActiveSubscription => Some("edd"),
            RelationKind::LeftReview | RelationKind::EventJsonProperty => None,
        }
    }

    /// Whether selections on this relation are option tokens
    pub fn uses_selectors(&self) -> bool {
        !matches!(self, RelationKind::EventJsonProperty)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::ActiveSubscription => "active_subscription",
            RelationKind::LeftReview => "left_review",
            RelationKind::EventJsonProperty => "event_json_property",
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One filter or condition row as posted by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FilterClause {
    /// Selected property key
    #[serde(alias = "data_key")]
    pub property: String,

    /// Raw operator string (`in`, `not_in`, `=`, `contains`, ...)
    #[serde(default)]
    pub operator: Option<String>,

    /// Token list or scalar compare value
    #[serde(default, alias = "data_value")]
    pub value: Value,

    /// Secondary value, the event property key for event filters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_value: Option<String>,
}

impl FilterClause {
    pub fn new(property: impl Into<String>, operator: impl Into<String>, value: Value) -> Self {
        Self {
            property: property.into(),
            operator: Some(operator.into()),
            value,
            extra_value: None,
        }
    }

    pub fn with_extra_value(mut self, extra: impl Into<String>) -> Self {
        self.extra_value = Some(extra.into());
        self
    }

    pub fn relation(&self) -> Option<RelationKind> {
        RelationKind::from_property_key(&self.property)
    }

    pub fn filter_operator(&self) -> FilterOperator {
        FilterOperator::from_host(self.operator.as_deref())
    }

    /// Selection tokens in posted order; scalars become a single token
    pub fn tokens(&self) -> Vec<String> {
        self.value
            .to_list()
            .iter()
            .map(Value::to_text)
            .filter(|t| !t.is_empty())
            .collect()
    }
}

/// Result of parsing a token list
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedSelection {
    /// Usable selectors in input order
    pub selectors: Vec<Selector>,
    /// Tokens that did not parse
    pub discarded: Vec<String>,
}

impl ParsedSelection {
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn has_any(&self) -> bool {
        self.selectors.iter().any(Selector::is_any)
    }

    pub fn buckets(&self) -> SelectorBuckets {
        SelectorBuckets::from_selectors(&self.selectors)
    }
}

/// Selectors partitioned by kind, duplicates removed, first occurrence order kept
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectorBuckets {
    pub any: bool,
    pub entire: Vec<u64>,
    pub simple: Vec<u64>,
    pub variants: Vec<(u64, u64)>,
}

impl SelectorBuckets {
    pub fn from_selectors(selectors: &[Selector]) -> Self {
        let mut buckets = SelectorBuckets::default();
        for selector in selectors {
            match *selector {
                Selector::Any => buckets.any = true,
                Selector::EntireEntity(id) => push_unique(&mut buckets.entire, id),
                Selector::SimpleEntity(id) => push_unique(&mut buckets.simple, id),
                Selector::EntityVariant(id, variant) => {
                    push_unique(&mut buckets.variants, (id, variant))
                }
            }
        }
        buckets
    }

    pub fn is_empty(&self) -> bool {
        !self.any && self.entire.is_empty() && self.simple.is_empty() && self.variants.is_empty()
    }
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}
