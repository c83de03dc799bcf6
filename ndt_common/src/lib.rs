//! # Network Data Template App: shared library
//!
//! Everything the server binary needs to authenticate against the platform,
//! discover its message-bus subscription, consume PM-counter messages and
//! report on counter coverage for the watched NRCellDU cells.

// Declare the modules to re-export
pub mod configs;
pub mod core;
pub mod ingestors;
pub mod loggers;
pub mod platform;
pub mod retrieve;

// Re-export the types every caller needs
pub use crate::configs::app_config::{AppConfig, ConfigArgs, ConfigError};
pub use crate::core::errors::PipelineError;
pub use crate::core::metrics::AppMetrics;
pub use crate::core::watch_set::WatchSetTracker;
pub use crate::platform::{Attribute, PlatformClient, PlatformError};
