//! Error types for EventViz.
//!
//! The core pipeline mostly logs and swallows these (a failed network yields
//! no data), but the Meraki client and the bootstrap code propagate them
//! with `?`.

use thiserror::Error;

/// Custom error type for EventViz operations.
#[derive(Debug, Error)]
pub enum EventVizError {
    /// Error making HTTP requests.
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// Error with HTTP headers (e.g., an API key that is not valid header text).
    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    /// Error when the API returns an unexpected data format.
    #[error("Invalid API response: {0}")]
    InvalidApiResponse(String),

    /// The Meraki API answered with a non-success status.
    #[error("Meraki API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A configuration value could not be used (e.g., a malformed base URL).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required environment variable is missing or empty.
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    /// No organization matched the configured id, or the key sees none.
    #[error("Organization not found: {0}")]
    OrganizationNotFound(String),

    /// Error building or querying a report DataFrame.
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}
