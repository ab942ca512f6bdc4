//! Data models for Meraki organizations, networks and event logs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Sentinel for a missing event category or type.
pub const UNKNOWN: &str = "Unknown";

/// A Meraki organization the API key can see.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

/// Read-only snapshot of a network from `GET /organizations/{id}/networks`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub product_types: BTreeSet<String>,
}

/// Event-type record as reported by `GET /networks/{id}/events/eventTypes`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, Hash)]
pub struct RawEventType {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A normalized event definition offered to the user for selection.
///
/// Ordered by `(category, event_type, description)`, which is also the
/// catalog's sort order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventDefinition {
    pub category: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub description: String,
}

impl From<RawEventType> for EventDefinition {
    fn from(raw: RawEventType) -> Self {
        Self {
            category: raw.category.unwrap_or_else(|| UNKNOWN.to_string()),
            event_type: raw.event_type.unwrap_or_else(|| UNKNOWN.to_string()),
            description: raw.description.unwrap_or_default(),
        }
    }
}

/// The two fields of an event log entry the aggregator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub occurred_at: String,
    pub event_type: String,
}

impl RawEvent {
    /// Extracts `occurredAt` and `type` from an untyped event record.
    ///
    /// Returns `None` when the value is not an object or either field is
    /// missing or not a string.
    pub fn from_value(value: &Value) -> Option<Self> {
        let record = value.as_object()?;
        let occurred_at = record.get("occurredAt")?.as_str()?;
        let event_type = record.get("type")?.as_str()?;
        Some(Self {
            occurred_at: occurred_at.to_string(),
            event_type: event_type.to_string(),
        })
    }
}

/// Parameters for one `GET /networks/{id}/events` page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub product_type: String,
    pub included_event_types: Vec<String>,
    pub occurred_after: String,
    pub ending_before: Option<String>,
    pub per_page: usize,
}

/// One page of the network event log.
///
/// Events are kept untyped so that a single malformed record can be dropped
/// without failing the whole page.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub page_start_at: Option<String>,
    #[serde(default)]
    pub page_end_at: Option<String>,
    #[serde(default)]
    pub events: Vec<Value>,
}

/// Per-day event-type counts for one network, keyed by `YYYY-MM-DD`.
pub type DailyCounts = BTreeMap<String, BTreeMap<String, u64>>;

/// network id → day → event type → count. Every stored count is at least 1.
pub type EventCountTable = BTreeMap<String, DailyCounts>;
