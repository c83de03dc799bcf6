//! # Application Metrics
//!
//! A private Prometheus registry holding the request counters of the HTTP
//! surface and the consumer's consumed/processed totals.

use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};

const NAMESPACE: &str = "network_data_template_app";

/// Counters exposed on `/metrics`.
#[derive(Clone)]
pub struct AppMetrics {
    registry: Registry,
    /// Successful `/topology` requests.
    pub topology_successful_requests: IntCounter,
    /// Failed `/topology` requests.
    pub topology_failed_requests: IntCounter,
    /// Successful `/network-configuration` requests.
    pub network_configuration_successful_requests: IntCounter,
    /// Failed `/network-configuration` requests.
    pub network_configuration_failed_requests: IntCounter,
    /// Messages pulled from the bus without a transport error.
    pub messages_consumed: IntCounter,
    /// Messages of the tracked type that decoded into a cell identifier.
    pub messages_processed: IntCounter,
}

impl AppMetrics {
    /// Builds the registry and registers every counter.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let c = IntCounter::with_opts(Opts::new(name, help).namespace(NAMESPACE))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        Ok(Self {
            topology_successful_requests: counter(
                "topology_successful_requests",
                "Total successful requests to Topology & Inventory",
            )?,
            topology_failed_requests: counter(
                "topology_failed_requests",
                "Total failed requests to Topology & Inventory",
            )?,
            network_configuration_successful_requests: counter(
                "network_configuration_successful_requests",
                "Total successful requests to Network Configuration",
            )?,
            network_configuration_failed_requests: counter(
                "network_configuration_failed_requests",
                "Total failed requests to Network Configuration",
            )?,
            messages_consumed: counter(
                "messages_consumed",
                "Total messages consumed from the message bus",
            )?,
            messages_processed: counter(
                "messages_processed",
                "Total NRCellDU messages processed",
            )?,
            registry,
        })
    }

    /// Renders every registered metric in the Prometheus text format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_uses_the_app_namespace() {
        let metrics = AppMetrics::new().unwrap();
        metrics.topology_successful_requests.inc();
        metrics.messages_consumed.inc_by(3);

        let text = metrics.render().unwrap();
        assert!(text.contains("network_data_template_app_topology_successful_requests 1"));
        assert!(text.contains("network_data_template_app_messages_consumed 3"));
        assert!(text.contains("network_data_template_app_network_configuration_failed_requests 0"));
    }

    #[test]
    fn instances_do_not_share_counters() {
        let first = AppMetrics::new().unwrap();
        let second = AppMetrics::new().unwrap();
        first.messages_processed.inc();
        assert_eq!(second.messages_processed.get(), 0);
    }
}
