mod aggregator;
mod catalog;
mod client;
mod error;
mod handlers;
mod logic;
mod models;
mod networks;
mod pagination;
mod report;
mod state;
#[cfg(test)]
mod testing;

use anyhow::Context as _;
use axum::{routing::get, Router};
use std::sync::Arc;
use tera::Tera;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span};
use tracing_subscriber::EnvFilter;

use crate::client::{resolve_organization, MerakiClient};
use crate::handlers::{
    api_event_counts, api_event_types, api_product_types, event_report, event_selection, index,
};
use crate::logic::EventLogic;
use crate::state::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("eventviz=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    info!(?config, "Starting EventViz");

    let client = Arc::new(MerakiClient::new(
        &config.api_key,
        &config.base_url,
        config.max_retries,
    )?);
    let organization = resolve_organization(client.as_ref(), config.organization_id.as_deref())
        .await
        .context("Failed to select a Meraki organization")?;
    info!(org_id = %organization.id, org_name = %organization.name, "Using organization");

    let tera = Tera::new(&config.template_glob).context("Failed to parse templates")?;

    let span = info_span!("eventviz", org_id = %organization.id);
    let logic = EventLogic::new(client, organization, span);
    let state = Arc::new(AppState::new(tera, logic));

    let app = Router::new()
        .route("/", get(index))
        .route("/events", get(event_selection))
        .route("/report", get(event_report))
        .route("/api/product-types", get(api_product_types))
        .route("/api/event-types", get(api_event_types))
        .route("/api/event-counts", get(api_event_counts))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
