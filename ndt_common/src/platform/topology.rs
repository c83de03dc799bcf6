//! # Topology & Inventory
//!
//! Lists NRCellDU entities and pulls the URN-prefixed source id out of each.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{InventoryApi, PlatformClient, PlatformError};

/// Prefix every watch identifier starts with.
pub const FDN_PREFIX: &str = "urn:3gpp:dn:";

const NR_CELL_DU_KEY: &str = "o-ran-smo-teiv-ran:NRCellDU";

#[derive(Debug, Deserialize)]
struct EntitiesResponse {
    items: Vec<Value>,
}

#[async_trait]
impl InventoryApi for PlatformClient {
    async fn get_entities(&self, limit: usize) -> Result<Vec<Value>, PlatformError> {
        let response: EntitiesResponse = self
            .api
            .get_json(
                "topology-inventory/v1alpha11/domains/RAN/entities",
                &[
                    ("targetFilter", "/NRCellDU/sourceIds".to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        debug!(count = response.items.len(), "Retrieved items from Topology & Inventory");
        Ok(response.items)
    }
}

/// The first `urn:3gpp:dn:` source id of each entity. Entities without one
/// are skipped.
pub fn extract_identifiers(entities: &[Value]) -> Vec<String> {
    let identifiers: Vec<String> = entities
        .iter()
        .filter_map(|cell| {
            let found = cell
                .get(NR_CELL_DU_KEY)
                .and_then(|nr| nr.get(0))
                .and_then(|nr| nr.get("sourceIds"))
                .and_then(Value::as_array)
                .and_then(|ids| {
                    ids.iter()
                        .filter_map(Value::as_str)
                        .find(|id| id.starts_with(FDN_PREFIX))
                })
                .map(str::to_string);
            if found.is_none() {
                debug!(%cell, "No source ID obtained from cell");
            }
            found
        })
        .collect();
    debug!(count = identifiers.len(), "Obtained source IDs");
    identifiers
}
