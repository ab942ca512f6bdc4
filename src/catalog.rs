//! Event type catalog builder.
//!
//! Visits every network of a product type, unions the event types they
//! declare and returns them as a sorted, de-duplicated list.

use itertools::Itertools;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument, Span};

use crate::client::MerakiApi;
use crate::models::{EventDefinition, RawEventType};
use crate::networks::NetworkCatalog;

pub struct EventCatalog<A> {
    api: Arc<A>,
    networks: NetworkCatalog<A>,
    span: Span,
}

impl<A: MerakiApi> EventCatalog<A> {
    pub fn new(api: Arc<A>, networks: NetworkCatalog<A>, span: Span) -> Self {
        Self {
            api,
            networks,
            span,
        }
    }

    /// Event definitions available for `product_type`, sorted by
    /// `(category, type)`.
    ///
    /// `category_filter` keeps only entries whose category matches exactly.
    /// A network whose catalog cannot be fetched is skipped. Nothing is
    /// cached: every call asks every matching network again.
    pub async fn event_definitions(
        &self,
        product_type: &str,
        category_filter: Option<&str>,
    ) -> Vec<EventDefinition> {
        async move {
            let networks = self.networks.list_networks(Some(product_type)).await;
            if networks.is_empty() {
                info!(product_type, "No networks found for product type");
                return Vec::new();
            }

            let mut seen: HashSet<RawEventType> = HashSet::new();
            for network in &networks {
                match self.api.get_network_event_types(&network.id).await {
                    Ok(types) => {
                        debug!(network_id = %network.id, count = types.len(), "Fetched event types");
                        seen.extend(types);
                    }
                    Err(e) => {
                        warn!(network_id = %network.id, error = %e, "Skipping network: failed to fetch event types");
                    }
                }
            }

            let definitions: Vec<EventDefinition> = seen
                .into_iter()
                .map(EventDefinition::from)
                .sorted()
                .dedup()
                .filter(|def| category_filter.is_none_or(|c| def.category == c))
                .collect();

            info!(
                product_type,
                ?category_filter,
                networks = networks.len(),
                definitions = definitions.len(),
                "Built event type catalog"
            );
            definitions
        }
        .instrument(self.span.clone())
        .await
    }
}
