//! Data Management: the data jobs of this rApp's data-access configuration.
//! The consumer id is the rApp client id.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{JobRegistry, PlatformClient, PlatformError};

#[async_trait]
impl JobRegistry for PlatformClient {
    async fn list_jobs(&self) -> Result<Vec<Value>, PlatformError> {
        let path = format!(
            "dmm-data-collection-controller/data-access/v2/{}/dataJobs",
            self.client_id
        );
        let jobs: Vec<Value> = self.jobs_api.get_json(&path, &[]).await?;
        debug!(count = jobs.len(), "Retrieved data job(s)");
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PipelineError;
    use crate::ingestors::ConnectionResolver;
    use crate::platform::{AccessToken, TokenSource};
    use axum::{http::StatusCode, routing::get, Router};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct StaticToken;

    impl TokenSource for StaticToken {
        fn get_token(&self) -> Result<AccessToken, PlatformError> {
            Ok(AccessToken {
                access_token: "t0k3n".into(),
                expires_at: Utc::now() + chrono::Duration::minutes(5),
            })
        }
    }

    /// Data Management that always answers 503, counting requests.
    async fn spawn_unavailable(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/dmm-data-collection-controller/data-access/v2/rapp-ndt/dataJobs",
            get(move || {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn resolver_attempts_map_one_to_one_onto_requests() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_unavailable(Arc::clone(&hits)).await;
        let client = PlatformClient::new(&base, "rapp-ndt", Arc::new(StaticToken), None).unwrap();

        let resolver = ConnectionResolver::new(Arc::new(client), 2, Duration::from_millis(1));
        let err = resolver.resolve().await.unwrap_err();

        assert!(matches!(err, PipelineError::Resolution(ref cause) if cause.contains("503")));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
