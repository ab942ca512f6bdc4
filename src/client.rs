//! Meraki Dashboard API client.
//!
//! `MerakiApi` is the seam the event pipeline depends on; `MerakiClient` is
//! the reqwest-backed implementation used by the server.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, LINK, RETRY_AFTER};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::EventVizError;
use crate::models::{EventPage, EventQuery, NetworkSummary, Organization, RawEventType};

/// Default Meraki Dashboard API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.meraki.com/api/v1";

/// Seconds to wait on a 429 that carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Remote operations the event pipeline needs from the Meraki API.
#[async_trait]
pub trait MerakiApi: Send + Sync {
    /// Organizations visible to the API key.
    async fn list_organizations(&self) -> Result<Vec<Organization>, EventVizError>;

    /// Networks of an organization, optionally limited to one product type.
    async fn list_networks(
        &self,
        organization_id: &str,
        product_type: Option<&str>,
    ) -> Result<Vec<NetworkSummary>, EventVizError>;

    /// Event types a network declares as valid for its event log.
    async fn get_network_event_types(
        &self,
        network_id: &str,
    ) -> Result<Vec<RawEventType>, EventVizError>;

    /// One page of a network's event log.
    async fn get_network_events(
        &self,
        network_id: &str,
        query: &EventQuery,
    ) -> Result<EventPage, EventVizError>;
}

/// reqwest implementation of [`MerakiApi`].
#[derive(Debug, Clone)]
pub struct MerakiClient {
    http: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl MerakiClient {
    /// Builds a client that authenticates every request with `api_key`.
    pub fn new(api_key: &str, base_url: &str, max_retries: u32) -> Result<Self, EventVizError> {
        let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", api_key))?;
        auth_value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth_value);

        let http = reqwest::Client::builder()
            .user_agent(concat!("EventViz/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    fn endpoint(&self, path: &str, params: &[(&str, String)]) -> Result<Url, EventVizError> {
        let raw = format!("{}{}", self.base_url, path);
        Url::parse_with_params(&raw, params)
            .map_err(|e| EventVizError::InvalidConfig(format!("bad API URL '{}': {}", raw, e)))
    }

    /// GETs `url` and decodes the JSON body, retrying on HTTP 429.
    ///
    /// Returns the response headers alongside the body so callers can follow
    /// `Link` pagination.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<(T, HeaderMap), EventVizError> {
        let mut attempt = 0;
        loop {
            debug!(%url, attempt, "GET");
            let response = self.http.get(url.clone()).send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                let wait = retry_after_secs(response.headers());
                warn!(%url, attempt, wait_secs = wait, "Rate limited by Meraki API, retrying");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(EventVizError::Api {
                    status: status.as_u16(),
                    message: api_error_message(&body),
                });
            }

            let headers = response.headers().clone();
            let body = response.json::<T>().await?;
            return Ok((body, headers));
        }
    }
}

#[async_trait]
impl MerakiApi for MerakiClient {
    async fn list_organizations(&self) -> Result<Vec<Organization>, EventVizError> {
        let url = self.endpoint("/organizations", &[])?;
        let (organizations, _) = self.get_json(url).await?;
        Ok(organizations)
    }

    async fn list_networks(
        &self,
        organization_id: &str,
        product_type: Option<&str>,
    ) -> Result<Vec<NetworkSummary>, EventVizError> {
        let mut params = Vec::new();
        if let Some(pt) = product_type {
            params.push(("productTypes[]", pt.to_string()));
        }
        let mut next = Some(self.endpoint(
            &format!("/organizations/{}/networks", organization_id),
            &params,
        )?);

        let mut networks = Vec::new();
        while let Some(url) = next.take() {
            let (page, headers): (Vec<NetworkSummary>, HeaderMap) = self.get_json(url).await?;
            networks.extend(page);
            next = next_link(&headers)
                .map(|link| {
                    Url::parse(&link).map_err(|e| {
                        EventVizError::InvalidApiResponse(format!("bad Link URL '{}': {}", link, e))
                    })
                })
                .transpose()?;
        }
        Ok(networks)
    }

    async fn get_network_event_types(
        &self,
        network_id: &str,
    ) -> Result<Vec<RawEventType>, EventVizError> {
        let url = self.endpoint(&format!("/networks/{}/events/eventTypes", network_id), &[])?;
        let (event_types, _) = self.get_json(url).await?;
        Ok(event_types)
    }

    async fn get_network_events(
        &self,
        network_id: &str,
        query: &EventQuery,
    ) -> Result<EventPage, EventVizError> {
        let url = self.endpoint(&format!("/networks/{}/events", network_id), &event_params(query))?;
        let (page, _) = self.get_json(url).await?;
        Ok(page)
    }
}

/// Query-string pairs for `GET /networks/{id}/events`.
fn event_params(query: &EventQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![("productType", query.product_type.clone())];
    params.extend(
        query
            .included_event_types
            .iter()
            .map(|t| ("includedEventTypes[]", t.clone())),
    );
    params.push(("occurredAfter", query.occurred_after.clone()));
    if let Some(ref cursor) = query.ending_before {
        params.push(("endingBefore", cursor.clone()));
    }
    params.push(("perPage", query.per_page.to_string()));
    params
}

/// Extracts the `rel=next` target from a `Link` header, if any.
fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|p| {
            let p = p.trim();
            p == "rel=next" || p == "rel=\"next\""
        });
        if is_next {
            target
                .strip_prefix('<')
                .and_then(|t| t.strip_suffix('>'))
                .map(str::to_string)
        } else {
            None
        }
    })
}

fn retry_after_secs(headers: &HeaderMap) -> u64 {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Meraki error bodies look like `{"errors": ["..."]}`.
fn api_error_message(body: &str) -> String {
    let joined = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("errors")?.as_array().map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
        })
        .filter(|s| !s.is_empty());

    match joined {
        Some(message) => message,
        None if body.trim().is_empty() => "no details".to_string(),
        None => body.trim().to_string(),
    }
}

/// Picks the organization the dashboard reports on.
///
/// A configured id must match one of the visible organizations; without
/// one, the first organization by name is used.
pub async fn resolve_organization<A: MerakiApi + ?Sized>(
    api: &A,
    configured_id: Option<&str>,
) -> Result<Organization, EventVizError> {
    let mut organizations = api.list_organizations().await?;
    match configured_id {
        Some(id) => organizations
            .into_iter()
            .find(|org| org.id == id)
            .ok_or_else(|| EventVizError::OrganizationNotFound(id.to_string())),
        None => {
            organizations.sort_by(|a, b| a.name.cmp(&b.name));
            organizations.into_iter().next().ok_or_else(|| {
                EventVizError::OrganizationNotFound("API key has no organizations".to_string())
            })
        }
    }
}
