//! # Platform Collaborators
//!
//! The REST capabilities of the network-management platform, each behind a
//! small trait so the pipeline can be driven by in-memory fakes in tests.
//! `PlatformClient` implements all of them over one authenticated
//! `ApiClient`.
//!
//! ## Contained Modules:
//! - **`client`**: the `PlatformClient` itself.
//! - **`data_management`**: data-job listing.
//! - **`schema_registry`**: schema lookup by id.
//! - **`topology`**: NRCellDU entity listing and identifier extraction.
//! - **`network_configuration`**: per-cell attribute reads.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The `PlatformClient` implementing every collaborator trait.
pub mod client;
/// Data Management data-job listing.
pub mod data_management;
/// Network Configuration attribute reads.
pub mod network_configuration;
/// Schema Registry lookups.
pub mod schema_registry;
/// Topology & Inventory entity listing.
pub mod topology;

pub use client::PlatformClient;
pub use network_configuration::{get_attributes_for_ids, AttributeReading};
pub use topology::extract_identifiers;

/// Failures talking to a platform capability.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The request never produced a response.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    /// The retry middleware gave up.
    #[error("HTTP middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),
    /// A request URL could not be built.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    /// The capability answered with a non-2xx status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },
    /// No access token could be obtained from IAM.
    #[error("missing access token: {0}")]
    MissingToken(String),
    /// The response parsed but did not have the expected shape.
    #[error("unexpected response body: {0}")]
    Body(String),
    /// A trust-anchor file could not be read.
    #[error("failed to read certificate: {0}")]
    Certificate(#[from] std::io::Error),
}

/// An IAM access token and the instant after which it must be refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Bearer token value.
    pub access_token: String,
    /// Expiry with the refresh leeway already subtracted.
    pub expires_at: DateTime<Utc>,
}

/// Supplies access tokens on demand.
///
/// Synchronous because the bus client calls it from its own threads. Async
/// callers go through `spawn_blocking`.
pub trait TokenSource: Send + Sync {
    /// Returns a valid token, fetching a new one when the cached one expired.
    fn get_token(&self) -> Result<AccessToken, PlatformError>;
}

/// Data Management: the data jobs registered for this client.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Lists every data job as raw JSON.
    async fn list_jobs(&self) -> Result<Vec<Value>, PlatformError>;
}

/// Schema Registry: Avro schema text by id.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Fetches the schema JSON registered under `schema_id`.
    async fn get_schema_by_id(&self, schema_id: &str) -> Result<String, PlatformError>;
}

/// Topology & Inventory: NRCellDU entities.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    /// Lists up to `limit` NRCellDU entities as raw JSON.
    async fn get_entities(&self, limit: usize) -> Result<Vec<Value>, PlatformError>;
}

/// Network Configuration: one attribute of one cell.
#[async_trait]
pub trait AttributeApi: Send + Sync {
    /// Reads `attribute` for the cell named by `identifier`.
    async fn get_attribute(
        &self,
        identifier: &str,
        attribute: Attribute,
    ) -> Result<Option<String>, PlatformError>;
}

/// The NRCellDU attributes the application knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Attribute {
    /// `administrativeState`
    AdministrativeState,
    /// `operationalState`
    #[default]
    OperationalState,
}

impl Attribute {
    /// Every accepted attribute, in the order they are listed to users.
    pub const ALL: [Attribute; 2] = [Attribute::AdministrativeState, Attribute::OperationalState];

    /// Wire name of the attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::AdministrativeState => "administrativeState",
            Attribute::OperationalState => "operationalState",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Attribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attribute::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<_> = Attribute::ALL.iter().map(Attribute::as_str).collect();
                format!("Invalid attribute: {s}. Allowed attributes are {allowed:?}")
            })
    }
}
