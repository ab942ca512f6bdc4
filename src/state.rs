use std::env;
use tera::Tera;

use crate::client::{MerakiClient, DEFAULT_BASE_URL};
use crate::error::EventVizError;
use crate::logic::EventLogic;

/// Application configuration from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Meraki Dashboard API key.
    pub api_key: String,
    /// Meraki API base URL.
    pub base_url: String,
    /// Organization to report on; the first one by name when unset.
    pub organization_id: Option<String>,
    /// Address to bind the HTTP server to.
    pub bind_address: String,
    /// Glob of the Tera templates.
    pub template_glob: String,
    /// How often a rate-limited (429) request is retried.
    pub max_retries: u32,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("organization_id", &self.organization_id)
            .field("bind_address", &self.bind_address)
            .field("template_glob", &self.template_glob)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl Config {
    /// Creates Config from environment variables with defaults.
    pub fn from_env() -> Result<Self, EventVizError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, EventVizError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            api_key: non_empty("MERAKI_API_KEY").ok_or(EventVizError::MissingConfig("MERAKI_API_KEY"))?,
            base_url: non_empty("MERAKI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            organization_id: non_empty("MERAKI_ORG_ID"),
            bind_address: non_empty("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8201".into()),
            template_glob: non_empty("TEMPLATE_GLOB").unwrap_or_else(|| "templates/**/*.html".into()),
            max_retries: match non_empty("MERAKI_MAX_RETRIES") {
                Some(v) => v.trim().parse().map_err(|_| {
                    EventVizError::InvalidConfig(format!("MERAKI_MAX_RETRIES must be a number, got '{}'", v))
                })?,
                None => 3,
            },
        })
    }
}

/// Shared application state passed to all request handlers.
pub struct AppState {
    /// Template engine for rendering HTML pages.
    pub tera: Tera,
    /// Event pipeline bound to the selected organization.
    pub logic: EventLogic<MerakiClient>,
}

impl AppState {
    pub fn new(tera: Tera, logic: EventLogic<MerakiClient>) -> Self {
        Self { tera, logic }
    }
}
