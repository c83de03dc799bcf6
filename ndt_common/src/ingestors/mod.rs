//! # Data Ingestors Module
//!
//! The front door for PM-counter data: everything between the Data
//! Management job listing and a watched cell being marked as observed.
//!
//! ## Contained Modules:
//! - **`connection`**: resolves the single subscription (host, port, topic)
//!   with bounded retry and exponential backoff.
//! - **`bus`** / **`kafka_bus`**: the message-bus seam and its rdkafka
//!   implementation with OAUTHBEARER authentication.
//! - **`schema_resolver`** / **`avro_codec`**: schema-id memoization and
//!   decoding of the framed Avro payloads.
//! - **`consumer`**: the streaming loop tying the above together.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Framed Avro payload decoding.
pub mod avro_codec;
/// The message-bus seam.
pub mod bus;
/// Subscription resolution via Data Management.
pub mod connection;
/// The streaming consumption loop.
pub mod consumer;
/// rdkafka-backed message bus.
pub mod kafka_bus;
/// Memoized schema-registry lookups.
pub mod schema_resolver;

// --- Public API Re-exports ---
pub use bus::{Delivery, InboundMessage, MessageBus, TransportError};
pub use connection::{ConnectionResolver, SubscriptionDescriptor};
pub use consumer::{ConsumerSettings, MessageOutcome, StreamingConsumer};
pub use kafka_bus::{KafkaBus, KafkaSettings};
pub use schema_resolver::SchemaResolver;
