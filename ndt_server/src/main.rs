//! # Network Data Template App
//!
//! Authenticates against the platform, discovers its PM-counter
//! subscription through Data Management, consumes the counter stream and
//! logs a coverage report for the watched NRCellDU cells on a fixed
//! interval. A small HTTP API serves ad-hoc queries, metrics and health checks; it
//! starts first and reports ready once the consumer is running.
//!
//! A fatal pipeline error (no subscription, or a broken bus connection)
//! ends the process with exit code 1.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndt_common::core::ReportGenerator;
use ndt_common::ingestors::{ConnectionResolver, KafkaBus, SchemaResolver, StreamingConsumer};
use ndt_common::loggers::setup_logging;
use ndt_common::platform::TokenSource;
use ndt_common::retrieve::OAuthTokenProvider;
use ndt_common::{
    AppConfig, AppMetrics, ConfigArgs, PipelineError, PlatformClient, WatchSetTracker,
};
use ndt_server::{router, spawn_server, AppState};
use tokio::runtime::Handle;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// Logs `error` at the highest severity and ends the process with its exit
/// code. The log guard is dropped first so buffered lines reach the file.
fn exit_fatal(error: &PipelineError, log_guard: WorkerGuard) -> ! {
    error!(fatal = true, error = %error, "Network Data Template App is terminating");
    drop(log_guard);
    std::process::exit(error.exit_code())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- Phase 1: Logging & Configuration ---
    // Logging needs only its own settings, so it comes up before the rest
    // of the configuration is resolved and can report problems with it.
    let args = ConfigArgs::load();
    let log_guard = setup_logging(&args.log_settings())?;
    info!("Starting up Network Data Template App...");
    let config = AppConfig::from_args(args)?;

    // --- Phase 2: Platform Access ---
    let tokens: Arc<dyn TokenSource> = Arc::new(OAuthTokenProvider::new(
        &config.iam_base_url,
        &config.iam_client_id,
        &config.iam_client_secret,
        config.ca_cert.as_deref(),
        Handle::current(),
    )?);
    let platform = Arc::new(PlatformClient::new(
        &config.iam_base_url,
        &config.iam_client_id,
        Arc::clone(&tokens),
        config.ca_cert.as_deref(),
    )?);
    let metrics = AppMetrics::new()?;
    let tracker = Arc::new(WatchSetTracker::new());

    // --- Phase 3: HTTP Server ---
    // Health checks answer from here on; readiness reports 503 until Phase 5 ends.
    let ready = Arc::new(AtomicBool::new(false));
    let app = router(AppState {
        inventory: platform.clone(),
        attributes: platform.clone(),
        metrics: metrics.clone(),
        ready: Arc::clone(&ready),
        topology_limit: config.topology_limit,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let stop_serving = CancellationToken::new();
    let server = spawn_server(listener, app, stop_serving.clone());
    tokio::spawn({
        let stop_serving = stop_serving.clone();
        async move {
            shutdown_signal().await;
            stop_serving.cancel();
        }
    });
    info!("Listening on http://{addr}, waiting for the message bus subscription");

    // --- Phase 4: Subscription ---
    let resolver =
        ConnectionResolver::new(platform.clone(), config.max_retries, config.retry_delay);
    let subscription = match resolver.resolve().await {
        Ok(subscription) => subscription,
        Err(e) => exit_fatal(&e, log_guard),
    };
    info!(%subscription, "Resolved message bus subscription");

    let kafka = config.kafka_settings();
    let bus = match KafkaBus::subscribe(&subscription, &kafka, Arc::clone(&tokens)) {
        Ok(bus) => Arc::new(bus),
        Err(e) => exit_fatal(&PipelineError::TransportFatal(e.to_string()), log_guard),
    };

    // --- Phase 5: Background Tasks ---
    let consumer = StreamingConsumer::new(
        bus,
        SchemaResolver::new(platform.clone()),
        platform.clone(),
        Arc::clone(&tracker),
        metrics,
        config.consumer_settings(),
    );
    let cancel = CancellationToken::new();
    let consumer_task = tokio::spawn({
        let cancel = cancel.clone();
        let stop_serving = stop_serving.clone();
        async move {
            let outcome = consumer.run(cancel).await;
            if outcome.is_err() {
                stop_serving.cancel();
            }
            outcome
        }
    });

    let reporter = Arc::new(ReportGenerator::new(
        Arc::clone(&tracker),
        platform.clone(),
        config.report_settings(),
    ));
    reporter.start_schedule().await?;

    ready.store(true, Ordering::SeqCst);
    info!("Network Data Template App is now ready on http://{addr}");

    let served = server.await;

    // --- Phase 6: Shutdown ---
    ready.store(false, Ordering::SeqCst);
    info!("Network Data Template App is shutting down.");
    reporter.stop_schedule().await;
    cancel.cancel();

    match consumer_task.await {
        Ok(Err(e)) if e.is_fatal() => exit_fatal(&e, log_guard),
        Ok(Err(e)) => warn!(error = %e, "Consumer stopped with an error"),
        Ok(Ok(())) => info!("Consumer stopped"),
        Err(e) => error!(error = %e, "Consumer task panicked"),
    }
    served??;
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
