use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ndt_common::platform::{AttributeApi, InventoryApi};
use ndt_common::{AppMetrics, Attribute, PlatformError};
use ndt_server::{router, spawn_server, AppState, BASE_PATH};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CELL_A: &str = concat!(
    "urn:3gpp:dn:SubNetwork=Europe,MeContext=NR01,",
    "ManagedElement=NR01,GNBDUFunction=1,NRCellDU=NR01-1"
);
const CELL_B: &str = concat!(
    "urn:3gpp:dn:SubNetwork=Europe,MeContext=NR02,",
    "ManagedElement=NR02,GNBDUFunction=1,NRCellDU=NR02-1"
);

fn cell(id: &str) -> Value {
    json!({ "o-ran-smo-teiv-ran:NRCellDU": [{ "id": "x", "sourceIds": ["urn:cmHandle:abc", id] }] })
}

struct Inventory {
    healthy: bool,
}

#[async_trait]
impl InventoryApi for Inventory {
    async fn get_entities(&self, limit: usize) -> Result<Vec<Value>, PlatformError> {
        if !self.healthy {
            return Err(PlatformError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok([cell(CELL_A), cell(CELL_B)].into_iter().take(limit).collect())
    }
}

struct Attributes;

#[async_trait]
impl AttributeApi for Attributes {
    async fn get_attribute(
        &self,
        id: &str,
        attribute: Attribute,
    ) -> Result<Option<String>, PlatformError> {
        match (id, attribute) {
            (CELL_A, Attribute::OperationalState) => Ok(Some("ENABLED".into())),
            (CELL_A, Attribute::AdministrativeState) => Ok(Some("UNLOCKED".into())),
            _ => Err(PlatformError::Status {
                status: 404,
                body: "no such cell".into(),
            }),
        }
    }
}

struct TestServer {
    base: String,
    metrics: AppMetrics,
    ready: Arc<AtomicBool>,
    stop: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

async fn start(healthy: bool, ready: bool) -> TestServer {
    let metrics = AppMetrics::new().unwrap();
    let ready = Arc::new(AtomicBool::new(ready));
    let app = router(AppState {
        inventory: Arc::new(Inventory { healthy }),
        attributes: Arc::new(Attributes),
        metrics: metrics.clone(),
        ready: Arc::clone(&ready),
        topology_limit: 10,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let stop = CancellationToken::new();
    let handle = spawn_server(listener, app, stop.clone());

    TestServer {
        base: format!("http://{addr}{BASE_PATH}"),
        metrics,
        ready,
        stop,
        handle,
    }
}

async fn serve(healthy: bool) -> TestServer {
    start(healthy, true).await
}

async fn get(url: String) -> (u16, String) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}

#[tokio::test]
async fn root_is_a_bad_request() {
    let server = serve(true).await;
    let (status, body) = get(format!("{}/", server.base)).await;
    assert_eq!(status, 400);
    assert_eq!(body, "400 Bad Request");
}

#[tokio::test]
async fn topology_returns_items_and_counts_success() {
    let server = serve(true).await;
    let (status, body) = get(format!("{}/topology", server.base)).await;

    assert_eq!(status, 200);
    let items: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(items, vec![cell(CELL_A), cell(CELL_B)]);
    assert_eq!(server.metrics.topology_successful_requests.get(), 1);
    assert_eq!(server.metrics.topology_failed_requests.get(), 0);
}

#[tokio::test]
async fn network_configuration_defaults_to_operational_state() {
    let server = serve(true).await;
    let (status, body) = get(format!("{}/network-configuration", server.base)).await;

    assert_eq!(status, 200);
    let mut rows: Vec<Value> = serde_json::from_str(&body).unwrap();
    rows.sort_by_key(|row| row["id"].as_str().unwrap_or_default().to_string());
    assert_eq!(
        rows,
        vec![
            json!({ "id": CELL_A, "operationalState": "ENABLED" }),
            json!({ "id": CELL_B, "operationalState": null }),
        ]
    );
    assert_eq!(server.metrics.network_configuration_successful_requests.get(), 1);
}

#[tokio::test]
async fn network_configuration_honours_the_attribute() {
    let server = serve(true).await;
    let url = format!(
        "{}/network-configuration?attribute=administrativeState",
        server.base
    );
    let (status, body) = get(url).await;

    assert_eq!(status, 200);
    let rows: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert!(rows.contains(&json!({ "id": CELL_A, "administrativeState": "UNLOCKED" })));
}

#[tokio::test]
async fn unknown_attribute_is_rejected() {
    let server = serve(true).await;
    let (status, body) =
        get(format!("{}/network-configuration?attribute=invalid", server.base)).await;

    assert_eq!(status, 400);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        body,
        json!({
            "Error": "Invalid attribute: invalid. \
                      Allowed attributes are [\"administrativeState\", \"operationalState\"]"
        })
    );
    assert_eq!(server.metrics.network_configuration_failed_requests.get(), 1);
    assert_eq!(server.metrics.network_configuration_successful_requests.get(), 0);
}

#[tokio::test]
async fn platform_failures_are_internal_errors_and_counted() {
    let server = serve(false).await;

    let (status, body) = get(format!("{}/topology", server.base)).await;
    assert_eq!(status, 500);
    assert_eq!(
        serde_json::from_str::<Value>(&body).unwrap(),
        json!({ "Error": "An internal server error occurred." })
    );

    let (status, _) = get(format!("{}/network-configuration", server.base)).await;
    assert_eq!(status, 500);

    let (_, metrics) = get(format!("{}/metrics", server.base)).await;
    assert!(metrics.contains("network_data_template_app_topology_failed_requests 1"));
    assert!(metrics.contains("network_data_template_app_network_configuration_failed_requests 1"));
    assert!(metrics.contains("network_data_template_app_topology_successful_requests 0"));
}

#[tokio::test]
async fn metrics_are_prometheus_text() {
    let server = serve(true).await;
    let response = reqwest::get(format!("{}/metrics", server.base)).await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let content_type = response.headers()[reqwest::header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));
    let body = response.text().await.unwrap();
    assert!(body.contains("# TYPE network_data_template_app_messages_consumed counter"));
    assert!(!body.contains("_created"));
}

#[tokio::test]
async fn readiness_follows_the_ready_flag() {
    let server = serve(true).await;
    let healthy = json!({
        "healthy": true,
        "checks": [{ "name": "server", "passed": true, "details": null }]
    });

    let (status, body) = get(format!("{}/health/liveness", server.base)).await;
    assert_eq!((status, serde_json::from_str::<Value>(&body).unwrap()), (200, healthy.clone()));

    let (status, _) = get(format!("{}/health/readiness", server.base)).await;
    assert_eq!(status, 200);

    server.ready.store(false, Ordering::SeqCst);
    let (status, body) = get(format!("{}/health/readiness", server.base)).await;
    assert_eq!(status, 503);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["healthy"], json!(false));

    let (status, _) = get(format!("{}/health/liveness", server.base)).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn health_checks_answer_before_startup_completes() {
    let server = start(true, false).await;

    let (status, _) = get(format!("{}/health/liveness", server.base)).await;
    assert_eq!(status, 200);
    let (status, body) = get(format!("{}/health/readiness", server.base)).await;
    assert_eq!(status, 503);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap()["healthy"], json!(false));

    server.ready.store(true, Ordering::SeqCst);
    let (status, _) = get(format!("{}/health/readiness", server.base)).await;
    assert_eq!(status, 200);

    server.stop.cancel();
    server.handle.await.unwrap().unwrap();
}
