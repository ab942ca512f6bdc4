//! Network catalog accessor.

use std::sync::Arc;
use tracing::{debug, error, Instrument, Span};

use crate::client::MerakiApi;
use crate::models::NetworkSummary;

/// Lists the networks of one organization.
///
/// Fails soft: a transport error is logged and reported as "no networks".
pub struct NetworkCatalog<A> {
    api: Arc<A>,
    organization_id: String,
    span: Span,
}

impl<A> Clone for NetworkCatalog<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            organization_id: self.organization_id.clone(),
            span: self.span.clone(),
        }
    }
}

impl<A: MerakiApi> NetworkCatalog<A> {
    pub fn new(api: Arc<A>, organization_id: impl Into<String>, span: Span) -> Self {
        Self {
            api,
            organization_id: organization_id.into(),
            span,
        }
    }

    /// Networks of the organization, keeping only those that carry
    /// `product_type` when one is given. No ordering is guaranteed.
    pub async fn list_networks(&self, product_type: Option<&str>) -> Vec<NetworkSummary> {
        async move {
            match self
                .api
                .list_networks(&self.organization_id, product_type)
                .await
            {
                Ok(networks) => {
                    let networks: Vec<NetworkSummary> = networks
                        .into_iter()
                        .filter(|n| product_type.is_none_or(|pt| n.product_types.contains(pt)))
                        .collect();
                    debug!(?product_type, count = networks.len(), "Listed networks");
                    networks
                }
                Err(e) => {
                    error!(?product_type, error = %e, "Failed to list networks");
                    Vec::new()
                }
            }
        }
        .instrument(self.span.clone())
        .await
    }
}
