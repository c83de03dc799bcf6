//! # HTTP Routes
//!
//! Ad-hoc topology and configuration queries, Prometheus metrics and the
//! health checks, all below `/network-data-template-app`.
//!
//! `/topology` and `/network-configuration` count their successes and
//! failures in the shared `AppMetrics`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use ndt_common::platform::{
    extract_identifiers, get_attributes_for_ids, AttributeApi, InventoryApi,
};
use ndt_common::{AppMetrics, Attribute};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

/// Prefix shared by every route.
pub const BASE_PATH: &str = "/network-data-template-app";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Topology & Inventory.
    pub inventory: Arc<dyn InventoryApi>,
    /// Network Configuration.
    pub attributes: Arc<dyn AttributeApi>,
    /// Request and consumer counters.
    pub metrics: AppMetrics,
    /// Flipped to true once startup completed, back to false on shutdown.
    pub ready: Arc<AtomicBool>,
    /// Number of cells listed per query.
    pub topology_limit: usize,
}

/// Handler failures and the response each maps to.
#[derive(Debug)]
enum ApiError {
    /// Caller error; the message is returned as is.
    BadRequest(String),
    /// Anything else; the cause is only logged.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                warn!("400 Bad Request: {message}");
                (StatusCode::BAD_REQUEST, Json(json!({ "Error": message }))).into_response()
            }
            ApiError::Internal(cause) => {
                error!("500 Internal Server Error: An error occurred - {cause}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "Error": "An internal server error occurred." })),
                )
                    .into_response()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct NetworkConfigurationQuery {
    attribute: Option<String>,
}

fn route(path: &str) -> String {
    format!("{BASE_PATH}{path}")
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(BASE_PATH, get(root))
        .route(&route("/"), get(root))
        .route(&route("/metrics"), get(metrics))
        .route(&route("/topology"), get(topology))
        .route(&route("/network-configuration"), get(network_configuration))
        .route(&route("/health/liveness"), get(liveness))
        .route(&route("/health/readiness"), get(readiness))
        .with_state(state)
}

async fn root() -> impl IntoResponse {
    info!("400 Bad request: User tried accessing '{BASE_PATH}/'");
    (StatusCode::BAD_REQUEST, "400 Bad Request")
}

async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body))
}

async fn topology(State(state): State<AppState>) -> Result<Json<Vec<Value>>, ApiError> {
    match state.inventory.get_entities(state.topology_limit).await {
        Ok(cells) => {
            state.metrics.topology_successful_requests.inc();
            info!("200 OK /topology");
            Ok(Json(cells))
        }
        Err(e) => {
            state.metrics.topology_failed_requests.inc();
            Err(ApiError::Internal(e.to_string()))
        }
    }
}

async fn network_configuration(
    State(state): State<AppState>,
    Query(query): Query<NetworkConfigurationQuery>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let result = read_network_configuration(&state, query.attribute.as_deref()).await;
    match &result {
        Ok(_) => {
            state.metrics.network_configuration_successful_requests.inc();
            info!("200 OK /network-configuration");
        }
        Err(_) => state.metrics.network_configuration_failed_requests.inc(),
    }
    result.map(Json)
}

async fn read_network_configuration(
    state: &AppState,
    attribute: Option<&str>,
) -> Result<Vec<Value>, ApiError> {
    let attribute = match attribute {
        None => Attribute::default(),
        Some(name) => name.parse::<Attribute>().map_err(ApiError::BadRequest)?,
    };

    let cells = state
        .inventory
        .get_entities(state.topology_limit)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let ids = extract_identifiers(&cells);

    let readings = get_attributes_for_ids(state.attributes.as_ref(), &ids, attribute).await;
    Ok(readings.iter().map(|reading| reading.to_json()).collect())
}

fn health_body(passed: bool) -> Value {
    json!({
        "healthy": passed,
        "checks": [{ "name": "server", "passed": passed, "details": null }]
    })
}

async fn liveness() -> Json<Value> {
    Json(health_body(true))
}

async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.ready.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(health_body(true)))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(health_body(false)))
    }
}
