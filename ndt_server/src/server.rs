//! # HTTP Server Task
//!
//! The router is served from its own task so that the health checks answer
//! while the rest of the app is still starting. Readiness stays false until
//! the caller flips the shared flag.

use std::io;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serves `app` on `listener` until `stop` is cancelled, then drains open
/// connections and returns.
pub fn spawn_server(
    listener: TcpListener,
    app: Router,
    stop: CancellationToken,
) -> JoinHandle<io::Result<()>> {
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await?;
        info!("HTTP server stopped");
        Ok(())
    })
}
