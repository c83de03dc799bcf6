//! # Connection Resolver
//!
//! Finds the one message-bus subscription this rApp is entitled to by listing
//! its Data Management data jobs. Listing failures are retried with
//! exponential backoff; an empty job list is a configuration problem and
//! fails at once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::core::PipelineError;
use crate::platform::JobRegistry;

/// Where to consume from. Resolved once per process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionDescriptor {
    /// Topic to subscribe to.
    pub topic: String,
    /// Bootstrap server hostname.
    pub host: String,
    /// Bootstrap server port, kept as text.
    pub port: String,
}

impl SubscriptionDescriptor {
    /// `host:port` for `bootstrap.servers`.
    pub fn bootstrap_servers(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for SubscriptionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}:{}", self.topic, self.host, self.port)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataJob {
    streaming_configuration_kafka: StreamingConfigurationKafka,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamingConfigurationKafka {
    topic_name: String,
    kafka_bootstrap_servers: Vec<BootstrapServer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BootstrapServer {
    hostname: String,
    port_address: PortAddress,
}

/// Data Management serves the port as a number or as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortAddress {
    Number(u64),
    Text(String),
}

impl fmt::Display for PortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortAddress::Number(n) => write!(f, "{n}"),
            PortAddress::Text(s) => f.write_str(s),
        }
    }
}

/// Parses the `streamingConfigurationKafka` block of one data job.
pub fn parse_subscription(job: &Value) -> Result<SubscriptionDescriptor, PipelineError> {
    let job = DataJob::deserialize(job)
        .map_err(|e| PipelineError::Resolution(format!("malformed data job: {e}")))?;
    let kafka = job.streaming_configuration_kafka;
    let server = kafka
        .kafka_bootstrap_servers
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::Resolution("data job lists no bootstrap servers".into()))?;

    let descriptor = SubscriptionDescriptor {
        topic: kafka.topic_name,
        host: server.hostname,
        port: server.port_address.to_string(),
    };
    debug!(%descriptor, "Parsed connection details for Message Bus");
    Ok(descriptor)
}

/// Lists data jobs with bounded retries and picks the first one.
pub struct ConnectionResolver {
    registry: Arc<dyn JobRegistry>,
    max_retries: u32,
    retry_delay: Duration,
}

impl ConnectionResolver {
    /// `max_retries` counts attempts in total; zero is treated as one.
    pub fn new(registry: Arc<dyn JobRegistry>, max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            registry,
            max_retries: max_retries.max(1),
            retry_delay,
        }
    }

    /// Resolves the subscription, waiting `retry_delay * 2^attempt` between
    /// failed attempts.
    ///
    /// # Errors
    /// `PipelineError::Resolution` when every attempt failed, when no data
    /// job exists, or when the chosen job cannot be parsed.
    pub async fn resolve(&self) -> Result<SubscriptionDescriptor, PipelineError> {
        let mut attempt: u32 = 0;
        let jobs = loop {
            match self.registry.list_jobs().await {
                Ok(jobs) => break jobs,
                Err(e) if attempt + 1 < self.max_retries => {
                    error!(
                        error = %e,
                        "Could not retrieve connection details from Data Management. \
                         Retrying... ({}/{})",
                        attempt + 1,
                        self.max_retries
                    );
                    tokio::time::sleep(self.retry_delay * 2u32.saturating_pow(attempt)).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(PipelineError::Resolution(format!(
                        "Elapsed retries ({}/{}): {e}",
                        attempt + 1,
                        self.max_retries
                    )));
                }
            }
        };

        match jobs.len() {
            0 => {
                error!(
                    "No data job found! Please ensure the data access configuration is \
                     defined correctly."
                );
                return Err(PipelineError::Resolution("No data job found!".into()));
            }
            1 => {
                let job_name = jobs[0]
                    .get("dataJobName")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("Invalid Data Job");
                debug!(job = job_name, "Retrieved data job");
            }
            n => warn!(
                count = n,
                "More than one data job retrieved. Only one active data job is supported, \
                 using the first."
            ),
        }

        parse_subscription(&jobs[0])
    }
}
