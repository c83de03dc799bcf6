//! # Message Bus Abstraction
//!
//! What the streaming consumer needs from a bus client, and nothing more:
//! a blocking bounded pull and an idempotent close. The rdkafka-backed
//! implementation lives in `kafka_bus`.

use std::time::Duration;

use thiserror::Error;

use crate::core::PipelineError;

/// A message as pulled from the bus, before any decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    /// Headers in wire order. Values may be absent.
    pub headers: Vec<(String, Option<Vec<u8>>)>,
    /// The raw record value.
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    /// Headers with their values decoded as UTF-8; absent values become "".
    pub fn parsed_headers(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .map(|(key, value)| {
                let value = value
                    .as_deref()
                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                    .unwrap_or_default();
                (key.clone(), value)
            })
            .collect()
    }
}

/// A bus-reported error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The subscription was closed; nothing can be pulled any more.
    #[error("consumer was closed: {0}")]
    Closed(String),
    /// The client can no longer make progress.
    #[error("fatal: {0}")]
    Fatal(String),
    /// A recoverable hiccup; the client keeps going on its own.
    #[error("{0}")]
    Transient(String),
}

impl TransportError {
    /// Whether the subscription must be torn down.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Transient(_))
    }
}

impl From<TransportError> for PipelineError {
    fn from(err: TransportError) -> Self {
        if err.is_fatal() {
            PipelineError::TransportFatal(err.to_string())
        } else {
            PipelineError::TransportNonFatal(err.to_string())
        }
    }
}

/// One slot of a pulled batch: either a message or the error delivered in
/// its place.
pub type Delivery = Result<InboundMessage, TransportError>;

/// A subscribed bus client.
pub trait MessageBus: Send + Sync {
    /// Blocks for at most `timeout` collecting up to `max_messages`.
    ///
    /// # Errors
    /// Any error returned here, rather than inside the batch, ends consumption.
    /// Pulling from a closed bus returns `TransportError::Closed`.
    fn pull(
        &self,
        max_messages: usize,
        timeout: Duration,
    ) -> Result<Vec<Delivery>, TransportError>;

    /// Leaves the consumer group and releases the client. Idempotent.
    fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_headers_decode_values_and_blank_missing_ones() {
        let msg = InboundMessage {
            headers: vec![
                ("schemaID".into(), Some(b"42".to_vec())),
                ("moType".into(), None),
            ],
            payload: None,
        };
        assert_eq!(
            msg.parsed_headers(),
            vec![
                ("schemaID".to_string(), "42".to_string()),
                ("moType".to_string(), String::new())
            ]
        );
    }

    #[test]
    fn only_transient_errors_are_recoverable() {
        assert!(!TransportError::Transient("broker down".into()).is_fatal());
        assert!(TransportError::Fatal("auth".into()).is_fatal());
        assert!(TransportError::Closed("closed".into()).is_fatal());
    }

    #[test]
    fn transport_errors_map_onto_pipeline_tags() {
        assert_eq!(
            PipelineError::from(TransportError::Transient("broker down".into())),
            PipelineError::TransportNonFatal("broker down".into())
        );
        assert_eq!(
            PipelineError::from(TransportError::Fatal("auth".into())),
            PipelineError::TransportFatal("fatal: auth".into())
        );
        assert!(PipelineError::from(TransportError::Closed("closed".into())).is_fatal());
    }
}
