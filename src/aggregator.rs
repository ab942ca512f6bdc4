//! Event count aggregator.
//!
//! Walks each network's event log back to the start of the lookback window
//! and folds the collected events into per-network, per-day, per-type
//! counts.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::client::MerakiApi;
use crate::models::{DailyCounts, EventCountTable, EventQuery, RawEvent};
use crate::networks::NetworkCatalog;
use crate::pagination::{parse_timestamp, PageState, Paginator};

/// Events requested per page.
pub const EVENTS_PER_PAGE: usize = 1000;

/// Longest lookback the dashboard accepts, in days.
pub const MAX_LOOKBACK_DAYS: u32 = 90;

/// Start of the lookback window, shared by every network of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    /// `start` as sent in `occurredAfter`, e.g. `2024-05-01T08:30:00Z`.
    pub occurred_after: String,
}

impl Window {
    pub fn ending_at(now: DateTime<Utc>, days_lookback: u32) -> Self {
        let start = (now - Duration::days(i64::from(days_lookback))).trunc_subsecs(0);
        Self {
            start,
            occurred_after: start.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

pub struct EventAggregator<A> {
    api: Arc<A>,
    networks: NetworkCatalog<A>,
    span: Span,
    per_page: usize,
}

impl<A: MerakiApi> EventAggregator<A> {
    pub fn new(api: Arc<A>, networks: NetworkCatalog<A>, span: Span) -> Self {
        Self {
            api,
            networks,
            span,
            per_page: EVENTS_PER_PAGE,
        }
    }

    #[cfg(test)]
    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    /// Daily counts of `selected_event_types` for every `product_type`
    /// network over the last `days_lookback` days.
    ///
    /// An empty selection or a lookback outside `1..=90` returns an empty
    /// table without touching the API.
    pub async fn event_counts(
        &self,
        product_type: &str,
        selected_event_types: &[String],
        days_lookback: u32,
    ) -> EventCountTable {
        self.event_counts_at(product_type, selected_event_types, days_lookback, Utc::now())
            .await
    }

    pub async fn event_counts_at(
        &self,
        product_type: &str,
        selected_event_types: &[String],
        days_lookback: u32,
        now: DateTime<Utc>,
    ) -> EventCountTable {
        async move {
            if selected_event_types.is_empty() {
                debug!(product_type, "No event types selected");
                return EventCountTable::new();
            }
            if !(1..=MAX_LOOKBACK_DAYS).contains(&days_lookback) {
                warn!(product_type, days_lookback, "Lookback outside 1..=90 days");
                return EventCountTable::new();
            }

            let window = Window::ending_at(now, days_lookback);
            let networks = self.networks.list_networks(Some(product_type)).await;

            let mut table = EventCountTable::new();
            for network in &networks {
                let (events, _) = self
                    .collect_events(&network.id, product_type, selected_event_types, &window)
                    .await;
                let daily = fold_events(&network.id, &events);
                if !daily.is_empty() {
                    table.insert(network.id.clone(), daily);
                }
            }

            info!(
                product_type,
                days_lookback,
                occurred_after = %window.occurred_after,
                networks = networks.len(),
                networks_with_events = table.len(),
                "Aggregated event counts"
            );
            table
        }
        .instrument(self.span.clone())
        .await
    }

    /// Pages backward through one network's log. A failed request ends the
    /// walk for this network but keeps what was already collected.
    ///
    /// Returns the collected events and the state pagination stopped in.
    async fn collect_events(
        &self,
        network_id: &str,
        product_type: &str,
        selected_event_types: &[String],
        window: &Window,
    ) -> (Vec<Value>, PageState) {
        let mut paginator = Paginator::new(window.start, self.per_page);
        let mut events = Vec::new();

        while paginator.is_fetching() {
            let query = EventQuery {
                product_type: product_type.to_string(),
                included_event_types: selected_event_types.to_vec(),
                occurred_after: window.occurred_after.clone(),
                ending_before: paginator.cursor().map(str::to_string),
                per_page: self.per_page,
            };
            match self.api.get_network_events(network_id, &query).await {
                Ok(page) => {
                    paginator.advance(&page);
                    events.extend(page.events);
                }
                Err(e) => {
                    paginator.fail();
                    error!(
                        network_id,
                        error = %e,
                        pages = paginator.pages(),
                        kept = events.len(),
                        "Failed to fetch events page"
                    );
                }
            }
        }

        debug!(
            network_id,
            pages = paginator.pages(),
            events = events.len(),
            state = ?paginator.state(),
            "Finished paginating"
        );
        (events, paginator.state())
    }
}

/// Calendar day (`YYYY-MM-DD`, UTC) of an `occurredAt` timestamp.
pub fn event_day(occurred_at: &str) -> Option<String> {
    parse_timestamp(occurred_at).map(|ts| ts.date_naive().format("%Y-%m-%d").to_string())
}

/// Counts events per day and type. Malformed records are logged and skipped.
pub fn fold_events(network_id: &str, events: &[Value]) -> DailyCounts {
    let mut daily = DailyCounts::new();
    for value in events {
        let Some(event) = RawEvent::from_value(value) else {
            warn!(network_id, "Dropping event without occurredAt or type");
            continue;
        };
        let Some(day) = event_day(&event.occurred_at) else {
            warn!(network_id, occurred_at = %event.occurred_at, "Dropping event with unparseable occurredAt");
            continue;
        };
        *daily
            .entry(day)
            .or_default()
            .entry(event.event_type)
            .or_insert(0) += 1;
    }
    daily
}
