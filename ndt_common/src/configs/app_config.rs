//! # Application Configuration
//!
//! Every setting comes from the environment (or a `.env` file) through
//! `clap`. Numeric values are read as text so that a malformed one falls
//! back to its default with a warning instead of stopping the app.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::ReportSettings;
use crate::ingestors::{ConsumerSettings, KafkaSettings};
use crate::loggers::LogSettings;
use crate::platform::Attribute;

const DEFAULT_LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "network-data-template-app.log";

/// Configuration problems that stop the app from starting.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    /// A variable holds a value outside its allowed set.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Raw settings as given on the command line or in the environment.
#[derive(Parser, Debug, Clone, Default)]
#[clap(about = "Network Data Template App", version)]
pub struct ConfigArgs {
    #[clap(
        long,
        env = "IAM_CLIENT_ID",
        help = "rApp client id, also the Data Management consumer id."
    )]
    pub iam_client_id: Option<String>,

    #[clap(
        long,
        env = "IAM_CLIENT_SECRET",
        hide_env_values = true,
        help = "rApp client secret."
    )]
    pub iam_client_secret: Option<String>,

    #[clap(long, env = "IAM_BASE_URL", help = "Base URL of the platform gateway.")]
    pub iam_base_url: Option<String>,

    #[clap(
        long,
        env = "CA_CERT_FILE_PATH",
        help = "Directory holding the platform CA certificate."
    )]
    pub ca_cert_file_path: Option<String>,

    #[clap(long, env = "CA_CERT_FILE_NAME", help = "File name of the platform CA certificate.")]
    pub ca_cert_file_name: Option<String>,

    #[clap(
        long,
        env = "KAFKA_CERT_MOUNT_PATH",
        help = "Mount path of the message-bus CA certificate."
    )]
    pub kafka_cert_mount_path: Option<String>,

    #[clap(
        long,
        env = "KAFKA_CERT_FILE_NAME",
        help = "File name of the message-bus CA certificate."
    )]
    pub kafka_cert_file_name: Option<String>,

    #[clap(long, env = "MAX_RETRIES", help = "Attempts at listing data jobs before giving up.")]
    pub max_retries: Option<String>,

    #[clap(long, env = "RETRY_DELAY", help = "Base delay in seconds between data-job attempts.")]
    pub retry_delay: Option<String>,

    #[clap(long, env = "CONSUMER_MESSAGE_BATCH_SIZE", help = "Maximum messages per pull.")]
    pub consumer_message_batch_size: Option<String>,

    #[clap(long, env = "CONSUMER_TIMEOUT", help = "Maximum seconds one pull may block.")]
    pub consumer_timeout: Option<String>,

    #[clap(long, env = "PORT", help = "HTTP listen port.")]
    pub port: Option<String>,

    #[clap(long, env = "LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "LOG_CTRL_FILE", help = "Log-control JSON file.")]
    pub log_ctrl_file: Option<PathBuf>,

    #[clap(
        long,
        env = "CONTAINER_NAME",
        help = "Container name looked up in the log-control file."
    )]
    pub container_name: Option<String>,

    #[clap(long, env = "REPORT_INTERVAL_MINUTES", help = "Minutes between coverage reports.")]
    pub report_interval_minutes: Option<String>,

    #[clap(long, env = "REPORT_ATTRIBUTE", help = "Attribute read per cell in reports.")]
    pub report_attribute: Option<String>,

    #[clap(long, env = "REPORT_CLEAR_DATA", help = "Reset the watch set after every report.")]
    pub report_clear_data: Option<String>,

    #[clap(long, env = "TOPOLOGY_LIMIT", help = "Number of cells to watch.")]
    pub topology_limit: Option<String>,
}

/// Resolved, typed configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub iam_client_id: String,
    pub iam_client_secret: String,
    pub iam_base_url: String,
    /// Platform CA, `/<CA_CERT_FILE_PATH>/<CA_CERT_FILE_NAME>`.
    pub ca_cert: Option<PathBuf>,
    /// Message-bus CA, `KAFKA_CERT_MOUNT_PATH` + `KAFKA_CERT_FILE_NAME`.
    pub kafka_cert: Option<String>,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub batch_size: usize,
    pub consumer_timeout: Duration,
    pub port: u16,
    pub log_dir: PathBuf,
    pub report_interval: Duration,
    pub report_attribute: Attribute,
    pub report_clear_data: bool,
    pub topology_limit: usize,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    non_blank(value).ok_or(ConfigError::Missing(name))
}

/// Parses `raw`, falling back to `default` with a warning when it is unset
/// or malformed.
fn parse_or_default<T>(name: &str, raw: Option<&str>, default: T) -> T
where
    T: FromStr + Display,
{
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => default,
        Some(text) => text.parse().unwrap_or_else(|_| {
            warn!("{name}={text:?} is not valid, using the default {default}");
            default
        }),
    }
}

/// Like `parse_or_default`, but zero is rejected too.
fn positive_or_default<T>(name: &str, raw: Option<&str>, default: T) -> T
where
    T: FromStr + Display + PartialOrd + Default + Copy,
{
    let value = parse_or_default(name, raw, default);
    if value > T::default() {
        value
    } else {
        warn!("{name}={value} must be greater than zero, using the default {default}");
        default
    }
}

/// Seconds as a positive `Duration`. Zero, negative and out-of-range values
/// fall back to `default` with a warning.
fn positive_secs_or_default(name: &str, raw: Option<&str>, default: f64) -> Duration {
    let fallback = Duration::from_secs_f64(default);
    let secs: f64 = positive_or_default(name, raw, default);
    Duration::try_from_secs_f64(secs).unwrap_or_else(|_| {
        warn!("{name}={secs} is out of range, using the default {default}");
        fallback
    })
}

fn parse_bool(name: &str, raw: Option<&str>, default: bool) -> bool {
    match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => default,
        Some("true" | "1" | "yes") => true,
        Some("false" | "0" | "no") => false,
        Some(other) => {
            warn!("{name}={other:?} is not a boolean, using the default {default}");
            default
        }
    }
}

impl ConfigArgs {
    /// Loads `.env` if present, then parses the command line and
    /// environment. Runs before logging is up, so it logs nothing.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }

    /// Logging settings, needed before the rest of the configuration is
    /// resolved so that resolution problems get logged.
    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            log_dir: self.log_dir.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            file_prefix: LOG_FILE_PREFIX.to_string(),
            log_ctrl_file: self.log_ctrl_file.clone(),
            container_name: non_blank(self.container_name.clone()),
        }
    }
}

impl AppConfig {
    /// Resolves raw arguments into a typed configuration.
    pub fn from_args(args: ConfigArgs) -> Result<Self, ConfigError> {
        let ca_cert = match (
            non_blank(args.ca_cert_file_path),
            non_blank(args.ca_cert_file_name),
        ) {
            (Some(dir), Some(name)) => Some(PathBuf::from("/").join(dir).join(name)),
            _ => None,
        };
        let kafka_cert = non_blank(Some(format!(
            "{}{}",
            args.kafka_cert_mount_path.unwrap_or_default().trim(),
            args.kafka_cert_file_name.unwrap_or_default().trim()
        )));

        let report_attribute = match non_blank(args.report_attribute) {
            None => Attribute::default(),
            Some(text) => text
                .parse()
                .map_err(|reason| ConfigError::Invalid { name: "REPORT_ATTRIBUTE", reason })?,
        };

        let consumer_timeout =
            positive_secs_or_default("CONSUMER_TIMEOUT", args.consumer_timeout.as_deref(), 1.0);
        let report_minutes: u64 = positive_or_default(
            "REPORT_INTERVAL_MINUTES",
            args.report_interval_minutes.as_deref(),
            15,
        );

        let config = Self {
            iam_client_id: required(args.iam_client_id, "IAM_CLIENT_ID")?,
            iam_client_secret: required(args.iam_client_secret, "IAM_CLIENT_SECRET")?,
            iam_base_url: required(args.iam_base_url, "IAM_BASE_URL")?,
            ca_cert,
            kafka_cert,
            max_retries: parse_or_default("MAX_RETRIES", args.max_retries.as_deref(), 5),
            retry_delay: Duration::from_secs(parse_or_default(
                "RETRY_DELAY",
                args.retry_delay.as_deref(),
                5,
            )),
            batch_size: positive_or_default(
                "CONSUMER_MESSAGE_BATCH_SIZE",
                args.consumer_message_batch_size.as_deref(),
                1000,
            ),
            consumer_timeout,
            port: parse_or_default("PORT", args.port.as_deref(), 8050),
            log_dir: args.log_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
            report_interval: Duration::from_secs(60 * report_minutes),
            report_attribute,
            report_clear_data: parse_bool(
                "REPORT_CLEAR_DATA",
                args.report_clear_data.as_deref(),
                true,
            ),
            topology_limit: parse_or_default("TOPOLOGY_LIMIT", args.topology_limit.as_deref(), 10),
        };
        debug!(
            port = config.port,
            batch_size = config.batch_size,
            topology_limit = config.topology_limit,
            "Configuration resolved"
        );
        Ok(config)
    }

    /// Consumer group shared by every replica of this rApp.
    pub fn consumer_group_id(&self) -> String {
        format!("{}-consumer-group", self.iam_client_id)
    }

    /// Batch size, pull timeout and watch-set size for the consumer.
    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            batch_size: self.batch_size,
            timeout: self.consumer_timeout,
            topology_limit: self.topology_limit,
        }
    }

    /// Client settings for the message-bus subscription.
    pub fn kafka_settings(&self) -> KafkaSettings {
        KafkaSettings {
            group_id: self.consumer_group_id(),
            principal: self.iam_client_id.clone(),
            ca_location: self.kafka_cert.clone(),
        }
    }

    /// Interval, attribute and reset policy of the coverage reporter.
    pub fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            interval: self.report_interval,
            attribute: self.report_attribute,
            clear_data: self.report_clear_data,
            ..ReportSettings::default()
        }
    }
}
