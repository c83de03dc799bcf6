//! # Schema Resolver
//!
//! Memoizes parsed Avro schemas by schema id for the life of the process.
//! Schema ids are immutable once minted, so nothing is ever evicted and the
//! cache grows with the number of distinct ids seen on the topic. Concurrent
//! first lookups of one id share a single registry call. Failed lookups are
//! not cached and are retried on the next message carrying that id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use apache_avro::Schema;
use tokio::sync::OnceCell;
use tracing::{debug, error};

use crate::core::PipelineError;
use crate::platform::SchemaSource;

type Slot = Arc<OnceCell<Arc<Schema>>>;

/// Schema-id to parsed-schema cache in front of the schema registry.
pub struct SchemaResolver {
    source: Arc<dyn SchemaSource>,
    cache: Mutex<HashMap<String, Slot>>,
}

impl SchemaResolver {
    /// An empty cache in front of `source`.
    pub fn new(source: Arc<dyn SchemaSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The schema registered under `schema_id`.
    ///
    /// # Errors
    /// `PipelineError::Schema` when it cannot be fetched or parsed.
    pub async fn resolve(&self, schema_id: &str) -> Result<Arc<Schema>, PipelineError> {
        let slot = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(cache.entry(schema_id.to_string()).or_default())
        };
        slot.get_or_try_init(|| self.fetch(schema_id)).await.cloned()
    }

    /// Number of schemas resolved successfully so far.
    pub fn cached(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    async fn fetch(&self, schema_id: &str) -> Result<Arc<Schema>, PipelineError> {
        let text = self.source.get_schema_by_id(schema_id).await.map_err(|e| {
            error!(schema_id, error = %e, "Error while fetching schema from schema registry");
            PipelineError::Schema(e.to_string())
        })?;
        let schema = Schema::parse_str(&text).map_err(|e| {
            error!(schema_id, error = %e, "Schema registry returned an unparseable schema");
            PipelineError::Schema(e.to_string())
        })?;
        debug!(schema_id, "Cached schema");
        Ok(Arc::new(schema))
    }
}
