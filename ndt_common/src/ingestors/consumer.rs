//! # Streaming Consumer
//!
//! Pulls PM-counter batches off the bus and marks every watched cell whose
//! counters show up. Each pull runs on the blocking pool. The messages of
//! one batch are then processed concurrently, and the next pull waits until
//! the whole batch is done.
//!
//! Transport errors delivered inside a batch are tagged as
//! `PipelineError::TransportNonFatal`, which is logged, or
//! `PipelineError::TransportFatal`, which closes the subscription. The pull
//! that follows a close fails, and `run` returns the fatal error, which
//! `main` turns into exit code 1. Schema and decode failures only drop the
//! message they belong to.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::avro_codec::decode_message;
use super::bus::{InboundMessage, MessageBus, TransportError};
use super::schema_resolver::SchemaResolver;
use crate::core::{AppMetrics, PipelineError, WatchSetTracker};
use crate::platform::topology::FDN_PREFIX;
use crate::platform::{extract_identifiers, InventoryApi};

/// Header carrying the schema-registry id of the payload.
pub const SCHEMA_ID_HEADER: &str = "schemaID";
/// Header carrying the managed-object type of the payload.
pub const MO_TYPE_HEADER: &str = "moType";
/// The only managed-object type the app tracks.
pub const TRACKED_MO_TYPE: &str = "NRCellDU_GNBDU";

/// Batch shape of every pull.
#[derive(Debug, Clone, Copy)]
pub struct ConsumerSettings {
    /// Upper bound on messages per pull.
    pub batch_size: usize,
    /// Upper bound on the time one pull may block.
    pub timeout: Duration,
    /// How many cells to seed the watch set with.
    pub topology_limit: usize,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            timeout: Duration::from_secs(1),
            topology_limit: 10,
        }
    }
}

/// What became of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// No `schemaID` header.
    MissingSchemaId,
    /// `moType` was something other than the tracked type.
    OtherMoType,
    /// Dropped with `PipelineError::Schema` when the schema could not be
    /// resolved, or `PipelineError::Decode` when the payload did not yield a
    /// cell identifier.
    Rejected(PipelineError),
    /// The payload named `identifier`; `marked` is true when it carried
    /// counters for a watched cell.
    Processed {
        /// The decoded watch identifier.
        identifier: String,
        /// Whether the watch set was updated.
        marked: bool,
    },
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// The streaming consumption pipeline.
pub struct StreamingConsumer {
    bus: Arc<dyn MessageBus>,
    schemas: SchemaResolver,
    inventory: Arc<dyn InventoryApi>,
    tracker: Arc<WatchSetTracker>,
    metrics: AppMetrics,
    settings: ConsumerSettings,
}

impl StreamingConsumer {
    /// Wires a consumer over an already subscribed bus.
    pub fn new(
        bus: Arc<dyn MessageBus>,
        schemas: SchemaResolver,
        inventory: Arc<dyn InventoryApi>,
        tracker: Arc<WatchSetTracker>,
        metrics: AppMetrics,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            bus,
            schemas,
            inventory,
            tracker,
            metrics,
            settings,
        }
    }

    /// Messages pulled without a transport error.
    pub fn consumed_count(&self) -> u64 {
        self.metrics.messages_consumed.get()
    }

    /// Messages of the tracked type that decoded into an identifier.
    pub fn processed_count(&self) -> u64 {
        self.metrics.messages_processed.get()
    }

    /// Seeds the watch set, then consumes until `cancel` fires or the bus
    /// fails fatally. Cancellation is checked between batches only. The bus
    /// is closed on the blocking pool when consumption ends, with or without
    /// an error.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PipelineError> {
        self.seed_watch_set().await;

        debug!("Starting to collect PM counters from the message bus.");
        let outcome = self.consume_until(&cancel).await;
        info!("Consumer is now closing.");
        self.close_bus().await;
        outcome
    }

    async fn consume_until(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        while !cancel.is_cancelled() {
            self.consume_batch().await?;
            debug!(
                consumed = self.consumed_count(),
                processed = self.processed_count(),
                "Consumption totals"
            );
        }
        Ok(())
    }

    /// Leaving the consumer group blocks, so it runs off the async workers.
    async fn close_bus(&self) {
        let bus = Arc::clone(&self.bus);
        if let Err(e) = tokio::task::spawn_blocking(move || bus.close()).await {
            error!(error = %e, "Closing the message bus failed");
        }
    }

    /// Lists the current cells and seeds the watch set with them. A failed
    /// listing leaves the watch set as it is.
    pub async fn seed_watch_set(&self) {
        debug!("Querying Topology & Inventory for cell data.");
        match self.inventory.get_entities(self.settings.topology_limit).await {
            Ok(cells) => self.tracker.seed(extract_identifiers(&cells)),
            Err(e) => error!(error = %e, "Could not seed watched cells from Topology & Inventory"),
        }
    }

    /// Pulls one batch and processes it completely.
    ///
    /// # Errors
    /// `PipelineError::TransportFatal` when the pull itself fails, including
    /// any pull after the subscription was closed.
    pub async fn consume_batch(&self) -> Result<(), PipelineError> {
        let bus = Arc::clone(&self.bus);
        let (max, timeout) = (self.settings.batch_size, self.settings.timeout);
        let deliveries = tokio::task::spawn_blocking(move || bus.pull(max, timeout))
            .await
            .map_err(|e| PipelineError::TransportFatal(format!("pull worker failed: {e}")))?
            .map_err(|e| {
                error!(fatal = true, error = %e, "Message bus pull failed");
                PipelineError::TransportFatal(e.to_string())
            })?;

        let messages: Vec<InboundMessage> = deliveries
            .into_iter()
            .filter_map(|delivery| delivery.map_err(|e| self.handle_transport_error(e)).ok())
            .collect();
        debug!(count = messages.len(), "Got messages in this batch");

        let started = Instant::now();
        join_all(messages.iter().map(|message| self.handle_message(message))).await;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Deserialized a batch");
        Ok(())
    }

    fn handle_transport_error(&self, err: TransportError) {
        let err = PipelineError::from(err);
        if err.is_fatal() {
            error!(
                fatal = true,
                error = %err,
                "Fatal error occurred while consuming messages from Kafka. App will close shortly."
            );
            self.bus.close();
        } else {
            error!(error = %err, "An error occurred while interacting with Kafka");
        }
    }

    /// Runs one error-free message through the pipeline.
    pub async fn handle_message(&self, message: &InboundMessage) -> MessageOutcome {
        let headers = message.parsed_headers();
        self.metrics.messages_consumed.inc();

        let schema_id = header(&headers, SCHEMA_ID_HEADER).filter(|id| !id.is_empty());
        let Some(schema_id) = schema_id else {
            warn!("Received a message without a schema ID in its headers");
            return MessageOutcome::MissingSchemaId;
        };

        let schema = self.schemas.resolve(schema_id).await;

        if header(&headers, MO_TYPE_HEADER) != Some(TRACKED_MO_TYPE) {
            return MessageOutcome::OtherMoType;
        }
        // The resolver has already logged why a schema is missing.
        let schema = match schema {
            Ok(schema) => schema,
            Err(e) => return MessageOutcome::Rejected(e),
        };

        let payload = message.payload.as_deref().unwrap_or_default();
        let record = match decode_message(payload, &schema, schema_id) {
            Ok(record) => record,
            Err(e) => {
                error!(schema_id, error = %e, "Could not decode message");
                return MessageOutcome::Rejected(e);
            }
        };

        let field = |name: &str| record.get(name).and_then(|v| v.as_str());
        let (Some(dn_prefix), Some(mo_fdn)) = (field("dnPrefix"), field("moFdn")) else {
            let e = PipelineError::Decode(format!(
                "record for schema ID {schema_id} has no dnPrefix or moFdn"
            ));
            warn!(schema_id, error = %e, "Decoded message names no cell");
            return MessageOutcome::Rejected(e);
        };
        let identifier = format!("{FDN_PREFIX}{dn_prefix},{mo_fdn}");

        let has_counters = record.get("pmCounters").is_some_and(|c| !c.is_null());
        let marked = has_counters && self.tracker.mark_observed(&identifier);
        if marked {
            debug!(%identifier, "PM counters observed");
        }

        self.metrics.messages_processed.inc();
        MessageOutcome::Processed { identifier, marked }
    }
}
