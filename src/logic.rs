//! Operations the dashboard pages and JSON API call into.

use itertools::Itertools;
use std::sync::Arc;
use tracing::{info_span, Instrument, Span};

use crate::aggregator::EventAggregator;
use crate::catalog::EventCatalog;
use crate::client::MerakiApi;
use crate::models::{EventCountTable, EventDefinition, NetworkSummary, Organization};
use crate::networks::NetworkCatalog;

/// Wires the network catalog, event type catalog and aggregator for one
/// organization. Each component logs under a child of `span`.
pub struct EventLogic<A> {
    organization: Organization,
    networks: NetworkCatalog<A>,
    catalog: EventCatalog<A>,
    aggregator: EventAggregator<A>,
    span: Span,
}

impl<A: MerakiApi> EventLogic<A> {
    pub fn new(api: Arc<A>, organization: Organization, span: Span) -> Self {
        let networks = NetworkCatalog::new(
            Arc::clone(&api),
            organization.id.clone(),
            info_span!(parent: &span, "networks"),
        );
        let catalog = EventCatalog::new(
            Arc::clone(&api),
            networks.clone(),
            info_span!(parent: &span, "event_catalog"),
        );
        let aggregator = EventAggregator::new(
            api,
            networks.clone(),
            info_span!(parent: &span, "event_counts"),
        );
        Self {
            organization,
            networks,
            catalog,
            aggregator,
            span,
        }
    }

    pub fn organization(&self) -> &Organization {
        &self.organization
    }

    /// Every product type used by at least one network, sorted.
    pub async fn get_unique_product_types(&self) -> Vec<String> {
        self.networks
            .list_networks(None)
            .instrument(self.span.clone())
            .await
            .into_iter()
            .flat_map(|n| n.product_types)
            .sorted()
            .dedup()
            .collect()
    }

    pub async fn get_filtered_event_types(
        &self,
        product_type: &str,
        event_category: Option<&str>,
    ) -> Vec<EventDefinition> {
        self.catalog
            .event_definitions(product_type, event_category)
            .await
    }

    pub async fn get_network_event_counts(
        &self,
        product_type: &str,
        selected_event_types: &[String],
        days_lookback: u32,
    ) -> EventCountTable {
        self.aggregator
            .event_counts(product_type, selected_event_types, days_lookback)
            .await
    }

    /// Networks of `product_type`, used to label report series.
    pub async fn list_networks(&self, product_type: &str) -> Vec<NetworkSummary> {
        self.networks.list_networks(Some(product_type)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{event, page, raw_type, FakeMeraki};

    fn logic(api: FakeMeraki) -> (Arc<FakeMeraki>, EventLogic<FakeMeraki>) {
        let api = Arc::new(api);
        let org = Organization {
            id: "O_1".into(),
            name: "Acme".into(),
        };
        (Arc::clone(&api), EventLogic::new(api, org, Span::none()))
    }

    #[tokio::test]
    async fn test_unique_product_types_sorted() {
        let (_, logic) = logic(
            FakeMeraki::new()
                .with_network("N_1", "Office", &["wireless", "switch"])
                .with_network("N_2", "Edge", &["appliance", "wireless"]),
        );
        assert_eq!(
            logic.get_unique_product_types().await,
            vec!["appliance", "switch", "wireless"]
        );
    }

    #[tokio::test]
    async fn test_unknown_product_type_is_empty_everywhere() {
        let (_, logic) = logic(
            FakeMeraki::new()
                .with_network("N_1", "Office", &["wireless"])
                .with_event_types("N_1", vec![raw_type("WPA", "wpa_auth", "WPA auth")])
                .with_pages("N_1", vec![Ok(page(vec![event("wpa_auth", "2024-05-05T08:00:00Z")], None))]),
        );
        assert!(logic.get_filtered_event_types("camera", None).await.is_empty());
        assert!(logic
            .get_network_event_counts("camera", &["wpa_auth".to_string()], 7)
            .await
            .is_empty());
        assert!(logic.list_networks("camera").await.is_empty());
    }

    #[tokio::test]
    async fn test_no_networks_means_no_product_types() {
        let (_, logic) = logic(FakeMeraki::new());
        assert!(logic.get_unique_product_types().await.is_empty());
    }

    #[tokio::test]
    async fn test_components_share_organization() {
        let (api, logic) = logic(FakeMeraki::new().with_network("N_1", "Office", &["wireless"]));
        logic.get_filtered_event_types("wireless", None).await;
        assert_eq!(logic.organization().name, "Acme");
        assert!(api.calls()[0].starts_with("list_networks:O_1:"));
    }
}
