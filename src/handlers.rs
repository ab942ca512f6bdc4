use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tera::Context;
use thiserror::Error;
use tracing::{error, info};

use crate::aggregator::MAX_LOOKBACK_DAYS;
use crate::models::EventDefinition;
use crate::report::build_report;
use crate::state::AppState;

/// Lookback pre-filled in the selection form.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

/// Query parameters for the event-type selection page and API.
#[derive(Debug, Deserialize)]
pub struct EventTypeQuery {
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub product_type: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none_str")]
    pub category: Option<String>,
}

fn empty_string_as_none_str<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => Ok(Some(s)),
    }
}

/// Why a report request was rejected. The messages are shown to the user.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("Please select a product type.")]
    MissingProductType,
    #[error("Please select at least one event type.")]
    NoEventTypes,
    #[error("Invalid value for 'Days to look back'. Please enter a number.")]
    InvalidDays,
    #[error("Days lookback must be a number between 1 and 90.")]
    DaysOutOfRange,
}

/// A validated report request.
///
/// Built from raw query pairs because the selection form submits one
/// `event_type` pair per checked box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub product_type: String,
    pub event_types: Vec<String>,
    pub days_lookback: u32,
}

impl ReportRequest {
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, FormError> {
        let product_type = first_value(pairs, "product_type").ok_or(FormError::MissingProductType)?;
        let event_types = selected_event_types(pairs);
        if event_types.is_empty() {
            return Err(FormError::NoEventTypes);
        }
        let days_lookback = match pairs.iter().find(|(k, _)| k == "days_lookback") {
            None => DEFAULT_LOOKBACK_DAYS,
            Some((_, raw)) => {
                let days: i64 = raw.trim().parse().map_err(|_| FormError::InvalidDays)?;
                if !(1..=i64::from(MAX_LOOKBACK_DAYS)).contains(&days) {
                    return Err(FormError::DaysOutOfRange);
                }
                days as u32
            }
        };
        Ok(Self {
            product_type: product_type.to_string(),
            event_types,
            days_lookback,
        })
    }
}

fn first_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, v)| k == key && !v.is_empty())
        .map(|(_, v)| v.as_str())
}

fn selected_event_types(pairs: &[(String, String)]) -> Vec<String> {
    pairs
        .iter()
        .filter(|(k, v)| k == "event_type" && !v.is_empty())
        .map(|(_, v)| v.clone())
        .unique()
        .collect()
}

/// One checkbox of the selection form.
#[derive(Debug, Serialize, PartialEq)]
struct EventOption {
    value: String,
    label: String,
    checked: bool,
}

/// Checkboxes under one category heading.
#[derive(Debug, Serialize, PartialEq)]
struct CategoryGroup {
    category: String,
    options: Vec<EventOption>,
}

/// Groups a `(category, type)`-sorted catalog by category.
fn group_by_category(definitions: &[EventDefinition], selected: &[String]) -> Vec<CategoryGroup> {
    definitions
        .iter()
        .chunk_by(|def| def.category.clone())
        .into_iter()
        .map(|(category, defs)| CategoryGroup {
            category,
            options: defs
                .map(|def| EventOption {
                    value: def.event_type.clone(),
                    label: format!("[{}] - {}", def.category, def.description),
                    checked: selected.contains(&def.event_type),
                })
                .collect(),
        })
        .collect()
}

/// `wireless` → `Wireless`.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[derive(Debug, Serialize)]
struct ProductTypeOption {
    value: String,
    label: String,
}

fn render_template(
    tera: &tera::Tera,
    template: &str,
    context: &Context,
) -> Result<Html<String>, (StatusCode, &'static str)> {
    tera.render(template, context).map(Html).map_err(|e| {
        error!("Template render error for '{}': {}", template, e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Render error")
    })
}

fn base_context(state: &AppState) -> Context {
    let mut context = Context::new();
    context.insert("organization", state.logic.organization());
    context.insert("warning", &None::<String>);
    context
}

async fn render_dashboard(state: &AppState, warning: Option<&str>) -> Response {
    let product_types: Vec<ProductTypeOption> = state
        .logic
        .get_unique_product_types()
        .await
        .into_iter()
        .map(|pt| ProductTypeOption {
            label: capitalize(&pt),
            value: pt,
        })
        .collect();

    let mut context = base_context(state);
    context.insert("product_types", &product_types);
    context.insert("warning", &warning);
    render_template(&state.tera, "dashboard.html", &context).into_response()
}

/// Previously submitted form values, echoed back on re-render.
struct SelectionForm<'a> {
    product_type: &'a str,
    category: Option<&'a str>,
    selected: &'a [String],
    days_lookback: &'a str,
    warning: Option<&'a str>,
}

async fn render_selection(state: &AppState, form: SelectionForm<'_>) -> Response {
    let definitions = state
        .logic
        .get_filtered_event_types(form.product_type, form.category)
        .await;
    let groups = group_by_category(&definitions, form.selected);

    let mut context = base_context(state);
    context.insert("product_type", form.product_type);
    context.insert("product_label", &capitalize(form.product_type));
    context.insert("category", &form.category);
    context.insert("groups", &groups);
    context.insert("days_lookback", form.days_lookback);
    context.insert("max_lookback", &MAX_LOOKBACK_DAYS);
    context.insert("warning", &form.warning);
    render_template(&state.tera, "events.html", &context).into_response()
}

/// GET / - Product type selection.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    render_dashboard(&state, None).await
}

/// GET /events - Event type and lookback selection for one product type.
pub async fn event_selection(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventTypeQuery>,
) -> impl IntoResponse {
    let Some(product_type) = query.product_type.as_deref() else {
        return render_dashboard(&state, Some(&FormError::MissingProductType.to_string())).await;
    };
    let default_days = DEFAULT_LOOKBACK_DAYS.to_string();
    render_selection(
        &state,
        SelectionForm {
            product_type,
            category: query.category.as_deref(),
            selected: &[],
            days_lookback: &default_days,
            warning: None,
        },
    )
    .await
}

/// GET /report - Daily event count charts.
pub async fn event_report(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> impl IntoResponse {
    let request = match ReportRequest::from_pairs(&pairs) {
        Ok(request) => request,
        Err(FormError::MissingProductType) => {
            return render_dashboard(&state, Some(&FormError::MissingProductType.to_string())).await;
        }
        Err(e) => {
            let product_type = first_value(&pairs, "product_type").unwrap_or_default();
            let selected = selected_event_types(&pairs);
            let days = pairs
                .iter()
                .find(|(k, _)| k == "days_lookback")
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| DEFAULT_LOOKBACK_DAYS.to_string());
            let warning = e.to_string();
            return render_selection(
                &state,
                SelectionForm {
                    product_type,
                    category: first_value(&pairs, "category"),
                    selected: &selected,
                    days_lookback: &days,
                    warning: Some(&warning),
                },
            )
            .await;
        }
    };

    info!(
        product_type = %request.product_type,
        event_types = request.event_types.len(),
        days_lookback = request.days_lookback,
        "Generating event count report"
    );
    let counts = state
        .logic
        .get_network_event_counts(&request.product_type, &request.event_types, request.days_lookback)
        .await;
    let networks = state.logic.list_networks(&request.product_type).await;
    let today = chrono::Local::now().date_naive();

    let report = match build_report(&counts, &networks, request.days_lookback, today) {
        Ok(report) => report,
        Err(e) => {
            error!("Report build error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Report error").into_response();
        }
    };
    // Embedded in a <script> element.
    let report_json = match serde_json::to_string(&report) {
        Ok(json) => json.replace("</", "<\\/"),
        Err(e) => {
            error!("Report serialization error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Report error").into_response();
        }
    };

    let mut context = base_context(&state);
    context.insert("product_type", &request.product_type);
    context.insert("title", &format!("{} Network Event Counts", capitalize(&request.product_type)));
    context.insert("days_lookback", &request.days_lookback);
    context.insert("event_types", &request.event_types);
    context.insert("has_charts", &!report.is_empty());
    context.insert("report_json", &report_json);
    render_template(&state.tera, "report.html", &context).into_response()
}

/// GET /api/product-types - Sorted product types of the organization.
pub async fn api_product_types(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.logic.get_unique_product_types().await)
}

/// GET /api/event-types - Event definitions for a product type.
pub async fn api_event_types(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventTypeQuery>,
) -> impl IntoResponse {
    let Some(product_type) = query.product_type.as_deref() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": FormError::MissingProductType.to_string()})),
        )
            .into_response();
    };
    Json(
        state
            .logic
            .get_filtered_event_types(product_type, query.category.as_deref())
            .await,
    )
    .into_response()
}

/// GET /api/event-counts - Raw network → day → type count table.
pub async fn api_event_counts(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> impl IntoResponse {
    match ReportRequest::from_pairs(&pairs) {
        Ok(request) => Json(
            state
                .logic
                .get_network_event_counts(
                    &request.product_type,
                    &request.event_types,
                    request.days_lookback,
                )
                .await,
        )
        .into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    mod report_request_tests {
        use super::*;

        #[test]
        fn test_collects_repeated_event_types() {
            let request = ReportRequest::from_pairs(&pairs(&[
                ("product_type", "wireless"),
                ("event_type", "wpa_auth"),
                ("event_type", "assoc"),
                ("event_type", "wpa_auth"),
                ("days_lookback", "14"),
            ]))
            .unwrap();
            assert_eq!(request.product_type, "wireless");
            assert_eq!(request.event_types, vec!["wpa_auth", "assoc"]);
            assert_eq!(request.days_lookback, 14);
        }

        #[test]
        fn test_defaults_lookback() {
            let request = ReportRequest::from_pairs(&pairs(&[
                ("product_type", "switch"),
                ("event_type", "port_status"),
            ]))
            .unwrap();
            assert_eq!(request.days_lookback, DEFAULT_LOOKBACK_DAYS);
        }

        #[test]
        fn test_rejects_missing_parts() {
            assert_eq!(
                ReportRequest::from_pairs(&pairs(&[("event_type", "a")])),
                Err(FormError::MissingProductType)
            );
            assert_eq!(
                ReportRequest::from_pairs(&pairs(&[("product_type", "wireless")])),
                Err(FormError::NoEventTypes)
            );
        }

        #[test]
        fn test_validates_lookback() {
            let with_days = |days: &str| {
                ReportRequest::from_pairs(&pairs(&[
                    ("product_type", "wireless"),
                    ("event_type", "a"),
                    ("days_lookback", days),
                ]))
            };
            assert_eq!(with_days("abc"), Err(FormError::InvalidDays));
            assert_eq!(with_days(""), Err(FormError::InvalidDays));
            assert_eq!(with_days("0"), Err(FormError::DaysOutOfRange));
            assert_eq!(with_days("91"), Err(FormError::DaysOutOfRange));
            assert_eq!(with_days("-3"), Err(FormError::DaysOutOfRange));
            assert_eq!(with_days("90").map(|r| r.days_lookback), Ok(90));
        }
    }

    mod presentation_tests {
        use super::*;

        fn def(category: &str, event_type: &str, description: &str) -> EventDefinition {
            EventDefinition {
                category: category.into(),
                event_type: event_type.into(),
                description: description.into(),
            }
        }

        #[test]
        fn test_groups_sorted_catalog_by_category() {
            let defs = vec![
                def("Association", "assoc", "802.11 association"),
                def("WPA", "wpa_auth", "WPA authentication"),
                def("WPA", "wpa_deauth", "WPA deauthentication"),
            ];
            let groups = group_by_category(&defs, &["wpa_deauth".to_string()]);
            assert_eq!(groups.len(), 2);
            assert_eq!(groups[1].category, "WPA");
            assert_eq!(groups[1].options.len(), 2);
            assert_eq!(groups[1].options[0].label, "[WPA] - WPA authentication");
            assert!(!groups[1].options[0].checked);
            assert!(groups[1].options[1].checked);
        }

        #[test]
        fn test_capitalize() {
            assert_eq!(capitalize("wireless"), "Wireless");
            assert_eq!(capitalize("cellularGateway"), "CellularGateway");
            assert_eq!(capitalize(""), "");
        }
    }

    mod template_tests {
        use super::*;
        use crate::models::Organization;
        use tera::Tera;

        fn templates() -> Tera {
            Tera::new("templates/**/*.html").unwrap()
        }

        fn context() -> Context {
            let mut context = Context::new();
            context.insert(
                "organization",
                &Organization {
                    id: "O_1".into(),
                    name: "Acme".into(),
                },
            );
            context.insert("warning", &None::<String>);
            context
        }

        #[test]
        fn test_renders_dashboard() {
            let mut context = context();
            context.insert(
                "product_types",
                &vec![ProductTypeOption {
                    value: "wireless".into(),
                    label: "Wireless".into(),
                }],
            );
            context.insert("warning", &Some("Please select a product type."));
            let html = templates().render("dashboard.html", &context).unwrap();
            assert!(html.contains("Organization: Acme (id: O_1)"));
            assert!(html.contains(r#"<option value="wireless">Wireless</option>"#));
            assert!(html.contains("Please select a product type."));
        }

        #[test]
        fn test_renders_event_selection() {
            let defs = vec![EventDefinition {
                category: "WPA".into(),
                event_type: "wpa_auth".into(),
                description: "WPA authentication".into(),
            }];
            let mut context = context();
            context.insert("product_type", "wireless");
            context.insert("product_label", &capitalize("wireless"));
            context.insert("category", &None::<String>);
            context.insert("groups", &group_by_category(&defs, &["wpa_auth".to_string()]));
            context.insert("days_lookback", &DEFAULT_LOOKBACK_DAYS);
            context.insert("max_lookback", &MAX_LOOKBACK_DAYS);
            let html = templates().render("events.html", &context).unwrap();
            assert!(html.contains("Wireless Event Type and Timeframe Selection"));
            assert!(html.contains(r#"value="wpa_auth" checked"#));
            assert!(html.contains("<legend>WPA</legend>"));
        }

        #[test]
        fn test_renders_report_with_and_without_charts() {
            let mut context = context();
            context.insert("product_type", "wireless");
            context.insert("title", "Wireless Network Event Counts");
            context.insert("days_lookback", &7);
            context.insert("event_types", &vec!["wpa_auth"]);
            context.insert("has_charts", &false);
            context.insert("report_json", "{}");
            let empty = templates().render("report.html", &context).unwrap();
            assert!(empty.contains("No events were collected for any network in the last 7 days."));

            context.insert("has_charts", &true);
            context.insert("report_json", r#"{"dates":[],"charts":[]}"#);
            let html = templates().render("report.html", &context).unwrap();
            assert!(html.contains("Wireless Network Event Counts (Last 7 Days)"));
            assert!(html.contains(r#"const report = {"dates":[],"charts":[]};"#));
            assert!(html.contains("/events?product_type=wireless"));
        }
    }
}
