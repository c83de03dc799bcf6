//! # Kafka Message Bus
//!
//! `MessageBus` over an rdkafka `BaseConsumer` authenticating with
//! SASL/OAUTHBEARER over TLS. Tokens come from the shared `TokenSource`.
//!
//! librdkafka reports client-level errors through `ClientContext::error`,
//! which cannot abort the pull in flight. A fatal one raises a flag; the bus
//! closes itself once that pull returns, and the next pull fails with
//! `TransportError::Closed`.

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rdkafka::client::OAuthToken;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::ClientContext;
use tracing::{debug, error, info};

use super::bus::{Delivery, InboundMessage, MessageBus, TransportError};
use super::connection::SubscriptionDescriptor;
use crate::platform::TokenSource;

/// Connection settings that do not come from Data Management.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    /// Consumer group, `<client id>-consumer-group`.
    pub group_id: String,
    /// OAUTHBEARER principal, the rApp client id.
    pub principal: String,
    /// CA bundle for the broker TLS connection.
    pub ca_location: Option<String>,
}

/// Whether librdkafka considers `error` unrecoverable for this client.
pub fn is_fatal(error: &KafkaError) -> bool {
    matches!(
        error.rdkafka_error_code(),
        Some(RDKafkaErrorCode::Fatal | RDKafkaErrorCode::Authentication)
    )
}

fn classify(error: &KafkaError) -> TransportError {
    if is_fatal(error) {
        TransportError::Fatal(error.to_string())
    } else {
        TransportError::Transient(error.to_string())
    }
}

/// Client context: hands out OAuth tokens and records fatal client errors.
pub struct BusContext {
    tokens: Arc<dyn TokenSource>,
    principal: String,
    fatal: AtomicBool,
}

impl BusContext {
    fn fatal_raised(&self) -> bool {
        self.fatal.load(Ordering::SeqCst)
    }
}

impl ClientContext for BusContext {
    const ENABLE_REFRESH_OAUTH_TOKEN: bool = true;

    fn error(&self, error: KafkaError, reason: &str) {
        if is_fatal(&error) {
            error!(
                fatal = true,
                %error,
                reason,
                "Fatal error occurred while consuming messages from Kafka. App will close shortly."
            );
            self.fatal.store(true, Ordering::SeqCst);
        } else {
            error!(%error, reason, "An error occurred while interacting with Kafka");
        }
    }

    fn generate_oauth_token(
        &self,
        _oauthbearer_config: Option<&str>,
    ) -> Result<OAuthToken, Box<dyn Error>> {
        debug!("Fetching access token for message bus consumer");
        let token = self.tokens.get_token()?;
        Ok(OAuthToken {
            token: token.access_token,
            principal_name: self.principal.clone(),
            lifetime_ms: token.expires_at.timestamp_millis(),
        })
    }
}

impl ConsumerContext for BusContext {}

/// A subscribed Kafka consumer. Dropping the inner consumer closes it.
pub struct KafkaBus {
    consumer: Mutex<Option<BaseConsumer<BusContext>>>,
}

impl KafkaBus {
    /// Builds the consumer and subscribes it to `subscription.topic`.
    pub fn subscribe(
        subscription: &SubscriptionDescriptor,
        settings: &KafkaSettings,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, KafkaError> {
        let context = BusContext {
            tokens,
            principal: settings.principal.clone(),
            fatal: AtomicBool::new(false),
        };

        let mut config = ClientConfig::new();
        config
            .set("group.id", &settings.group_id)
            .set("bootstrap.servers", subscription.bootstrap_servers())
            .set("isolation.level", "read_committed")
            .set("auto.offset.reset", "latest")
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanisms", "OAUTHBEARER");
        if let Some(ca) = &settings.ca_location {
            config.set("ssl.ca.location", ca);
        }

        let consumer: BaseConsumer<BusContext> = config.create_with_context(context)?;
        consumer.subscribe(&[subscription.topic.as_str()])?;
        info!(topic = %subscription.topic, "Subscribed to Kafka topic");

        Ok(Self {
            consumer: Mutex::new(Some(consumer)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<BaseConsumer<BusContext>>> {
        self.consumer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn to_inbound(message: &BorrowedMessage<'_>) -> InboundMessage {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|h| (h.key.to_string(), h.value.map(<[u8]>::to_vec)))
                .collect()
        })
        .unwrap_or_default();
    InboundMessage {
        headers,
        payload: message.payload().map(<[u8]>::to_vec),
    }
}

/// Collects up to `max_messages` deliveries from `poll` until `timeout` has
/// elapsed or `poll` comes back empty. `poll` is always called at least
/// once, so a zero timeout or batch size still makes progress.
fn drain<F>(max_messages: usize, timeout: Duration, mut poll: F) -> Vec<Delivery>
where
    F: FnMut(Duration) -> Option<Delivery>,
{
    let max_messages = max_messages.max(1);
    let deadline = Instant::now() + timeout;
    let mut batch = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match poll(remaining) {
            None => break,
            Some(delivery) => batch.push(delivery),
        }
        if batch.len() >= max_messages || Instant::now() >= deadline {
            break;
        }
    }
    batch
}

impl MessageBus for KafkaBus {
    fn pull(
        &self,
        max_messages: usize,
        timeout: Duration,
    ) -> Result<Vec<Delivery>, TransportError> {
        let guard = self.lock();
        let consumer = guard.as_ref().ok_or_else(|| {
            TransportError::Closed("Tried to consume after consumer was closed".into())
        })?;

        let batch = drain(max_messages, timeout, |remaining| {
            consumer.poll(remaining).map(|polled| match polled {
                Ok(message) => Ok(to_inbound(&message)),
                Err(e) => Err(classify(&e)),
            })
        });

        let fatal = consumer.context().fatal_raised();
        drop(guard);
        if fatal {
            self.close();
        }
        Ok(batch)
    }

    fn close(&self) {
        if let Some(consumer) = self.lock().take() {
            consumer.unsubscribe();
            info!("Kafka consumer closed");
        }
    }
}
