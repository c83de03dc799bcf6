//! # Configuration Modules
//!
//! Environment-driven settings for the server and the pipeline.

/// Typed application configuration loaded through `clap` and `dotenvy`.
pub mod app_config;

pub use app_config::{AppConfig, ConfigArgs, ConfigError};
