//! # Tracing Setup
//!
//! Console output for humans plus JSON lines in a daily-rolling file.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use super::log_control::{resolve_level, DEFAULT_LEVEL};

/// Where and how verbosely to log.
#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Directory for the rolling JSON log files.
    pub log_dir: PathBuf,
    /// File name prefix of the rolling log files.
    pub file_prefix: String,
    /// Optional log-control file.
    pub log_ctrl_file: Option<PathBuf>,
    /// This container's name in the log-control file.
    pub container_name: Option<String>,
}

/// Logging could not be initialized.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log directory could not be created.
    #[error("failed to create log directory: {0}")]
    Io(#[from] io::Error),
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Installs the global subscriber. Keep the returned guard alive for the
/// life of the process or buffered file output is lost.
pub fn setup_logging(settings: &LogSettings) -> Result<WorkerGuard, LoggingError> {
    std::fs::create_dir_all(&settings.log_dir)?;

    let rust_log = std::env::var("RUST_LOG").ok();
    let level = resolve_level(
        rust_log.as_deref(),
        settings.log_ctrl_file.as_deref(),
        settings.container_name.as_deref(),
    );

    let file_appender = rolling::daily(&settings.log_dir, &settings.file_prefix);
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(true).with_ansi(true);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_appender)
        .json();

    let env_filter =
        EnvFilter::try_new(&level.directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    for note in &level.notes {
        warn!("{note}");
    }
    info!("Logging initialized with level: {}", level.directive);
    Ok(guard)
}
