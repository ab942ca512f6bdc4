//! In-memory `MerakiApi` used by unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::client::MerakiApi;
use crate::error::EventVizError;
use crate::models::{EventPage, EventQuery, NetworkSummary, Organization, RawEventType};

/// Scripted API: fixed organizations, networks and event types, plus a
/// queue of event pages per network. Every call is recorded.
#[derive(Default)]
pub struct FakeMeraki {
    organizations: Vec<Organization>,
    networks: Vec<NetworkSummary>,
    fail_list_networks: bool,
    event_types: HashMap<String, Result<Vec<RawEventType>, String>>,
    pages: Mutex<HashMap<String, VecDeque<Result<EventPage, String>>>>,
    calls: Mutex<Vec<String>>,
    queries: Mutex<Vec<(String, EventQuery)>>,
}

impl FakeMeraki {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_organizations(mut self, organizations: Vec<Organization>) -> Self {
        self.organizations = organizations;
        self
    }

    pub fn with_network(mut self, id: &str, name: &str, product_types: &[&str]) -> Self {
        self.networks.push(NetworkSummary {
            id: id.to_string(),
            name: name.to_string(),
            product_types: product_types.iter().map(|p| p.to_string()).collect(),
        });
        self
    }

    pub fn failing_network_list(mut self) -> Self {
        self.fail_list_networks = true;
        self
    }

    pub fn with_event_types(mut self, network_id: &str, types: Vec<RawEventType>) -> Self {
        self.event_types.insert(network_id.to_string(), Ok(types));
        self
    }

    pub fn with_failing_event_types(mut self, network_id: &str) -> Self {
        self.event_types
            .insert(network_id.to_string(), Err("boom".to_string()));
        self
    }

    /// Queues event pages for a network; once drained, an empty page is served.
    pub fn with_pages(self, network_id: &str, pages: Vec<Result<EventPage, String>>) -> Self {
        self.pages
            .lock()
            .unwrap()
            .insert(network_id.to_string(), pages.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn event_queries(&self) -> Vec<(String, EventQuery)> {
        self.queries.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn fake_error(message: &str) -> EventVizError {
    EventVizError::Api {
        status: 500,
        message: message.to_string(),
    }
}

/// Mirrors the server-side `includedEventTypes` filter.
fn is_included(event: &Value, included: &[String]) -> bool {
    match event.get("type").and_then(Value::as_str) {
        Some(t) => included.iter().any(|i| i == t),
        None => true,
    }
}

#[async_trait]
impl MerakiApi for FakeMeraki {
    async fn list_organizations(&self) -> Result<Vec<Organization>, EventVizError> {
        self.record("list_organizations".to_string());
        Ok(self.organizations.clone())
    }

    async fn list_networks(
        &self,
        organization_id: &str,
        product_type: Option<&str>,
    ) -> Result<Vec<NetworkSummary>, EventVizError> {
        self.record(format!("list_networks:{}:{:?}", organization_id, product_type));
        if self.fail_list_networks {
            return Err(fake_error("network list unavailable"));
        }
        Ok(self
            .networks
            .iter()
            .filter(|n| product_type.is_none_or(|pt| n.product_types.contains(pt)))
            .cloned()
            .collect())
    }

    async fn get_network_event_types(
        &self,
        network_id: &str,
    ) -> Result<Vec<RawEventType>, EventVizError> {
        self.record(format!("get_network_event_types:{}", network_id));
        match self.event_types.get(network_id) {
            Some(Ok(types)) => Ok(types.clone()),
            Some(Err(message)) => Err(fake_error(message)),
            None => Ok(Vec::new()),
        }
    }

    async fn get_network_events(
        &self,
        network_id: &str,
        query: &EventQuery,
    ) -> Result<EventPage, EventVizError> {
        self.record(format!("get_network_events:{}", network_id));
        self.queries
            .lock()
            .unwrap()
            .push((network_id.to_string(), query.clone()));
        let next = self
            .pages
            .lock()
            .unwrap()
            .get_mut(network_id)
            .and_then(VecDeque::pop_front);
        match next {
            Some(Ok(mut page)) => {
                page.events
                    .retain(|e| is_included(e, &query.included_event_types));
                Ok(page)
            }
            Some(Err(message)) => Err(fake_error(&message)),
            None => Ok(EventPage::default()),
        }
    }
}

/// An event record as the Meraki API returns it.
pub fn event(event_type: &str, occurred_at: &str) -> Value {
    json!({
        "occurredAt": occurred_at,
        "type": event_type,
        "description": "test event",
        "category": "test"
    })
}

pub fn page(events: Vec<Value>, page_start_at: Option<&str>) -> EventPage {
    EventPage {
        message: None,
        page_start_at: page_start_at.map(str::to_string),
        page_end_at: None,
        events,
    }
}

pub fn raw_type(category: &str, event_type: &str, description: &str) -> RawEventType {
    RawEventType {
        category: Some(category.to_string()),
        event_type: Some(event_type.to_string()),
        description: Some(description.to_string()),
    }
}
