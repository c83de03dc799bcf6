//! # Network Configuration
//!
//! Reads one attribute of one NRCellDU through the NCMP passthrough
//! operational datastore, and fans that read out over many cells.
//!
//! A cell FDN such as
//! `urn:3gpp:dn:SubNetwork=Europe,ManagedElement=ME1,GNBDUFunction=1,NRCellDU=C1`
//! splits at its `ManagedElement` RDN: the part up to and including it names
//! the CM handle, the part below it becomes the resource identifier
//! `/GNBDUFunction[@id=1]/NRCellDU[@id=C1]`.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::time::Instant;
use tracing::{debug, error};

use super::topology::FDN_PREFIX;
use super::{Attribute, AttributeApi, PlatformClient, PlatformError};
use crate::core::PipelineError;

const MANAGED_ELEMENT: &str = "ManagedElement";

/// CM handle and resource identifier addressing one managed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NcmpTarget {
    /// Upper-case hex digest identifying the managed element.
    pub cm_handle: String,
    /// XPath-like path of the object below the managed element.
    pub resource_identifier: String,
}

/// Splits a prefixed FDN into its NCMP address.
pub fn ncmp_target(fdn: &str) -> Result<NcmpTarget, PlatformError> {
    let bare = fdn.strip_prefix(FDN_PREFIX).unwrap_or(fdn);
    let rdns: Vec<(&str, &str)> = bare
        .split(',')
        .map(|rdn| {
            rdn.split_once('=')
                .ok_or_else(|| PlatformError::Body(format!("malformed RDN '{rdn}' in {fdn}")))
        })
        .collect::<Result<_, _>>()?;

    let me_index = rdns
        .iter()
        .position(|(kind, _)| *kind == MANAGED_ELEMENT)
        .ok_or_else(|| PlatformError::Body(format!("no {MANAGED_ELEMENT} in {fdn}")))?;
    let (element, below) = rdns.split_at(me_index + 1);
    if below.is_empty() {
        return Err(PlatformError::Body(format!("{fdn} names a managed element, not a cell")));
    }

    let element_fdn = element
        .iter()
        .map(|(kind, value)| format!("{kind}={value}"))
        .collect::<Vec<_>>()
        .join(",");
    let digest = Sha256::digest(element_fdn.as_bytes());

    Ok(NcmpTarget {
        cm_handle: hex::encode_upper(&digest[..16]),
        resource_identifier: below
            .iter()
            .map(|(kind, value)| format!("/{kind}[@id={value}]"))
            .collect(),
    })
}

#[async_trait]
impl AttributeApi for PlatformClient {
    async fn get_attribute(
        &self,
        identifier: &str,
        attribute: Attribute,
    ) -> Result<Option<String>, PlatformError> {
        let target = ncmp_target(identifier)?;
        let path = format!(
            "ncmp/v1/ch/{}/data/ds/ncmp-datastore:passthrough-operational",
            target.cm_handle
        );
        let body: Value = self
            .api
            .get_json(
                &path,
                &[
                    ("resourceIdentifier", target.resource_identifier),
                    ("options", format!("(fields=attributes/{attribute})")),
                ],
            )
            .await?;

        Ok(body
            .pointer(&format!("/NRCellDU/0/attributes/{attribute}"))
            .and_then(|value| match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            }))
    }
}

/// One cell's attribute value, `None` when it could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeReading {
    /// Watch identifier of the cell.
    pub id: String,
    /// Attribute that was requested.
    pub attribute: Attribute,
    /// Value read, if any.
    pub value: Option<String>,
    /// `PipelineError::PerItem` when the read failed.
    pub error: Option<PipelineError>,
}

impl AttributeReading {
    /// `{"id": ..., "<attribute>": value-or-null}`
    pub fn to_json(&self) -> Value {
        let mut row = Map::new();
        row.insert("id".into(), Value::String(self.id.clone()));
        row.insert(
            self.attribute.as_str().into(),
            self.value.clone().map_or(Value::Null, Value::String),
        );
        Value::Object(row)
    }
}

/// Reads `attribute` for every identifier concurrently. A failed read is
/// logged and yields `None`, tagged with its per-item error, for that
/// identifier only.
pub async fn get_attributes_for_ids(
    api: &dyn AttributeApi,
    identifiers: &[String],
    attribute: Attribute,
) -> Vec<AttributeReading> {
    debug!(count = identifiers.len(), %attribute, "Fetching attributes concurrently");
    let started = Instant::now();

    let readings = join_all(identifiers.iter().map(|id| async move {
        let (value, error) = match api.get_attribute(id, attribute).await {
            Ok(value) => (value, None),
            Err(e) => {
                error!(error = %e, "Failed to get '{attribute}' for '{id}'.");
                let cause = format!("'{attribute}' for '{id}': {e}");
                (None, Some(PipelineError::PerItem(cause)))
            }
        };
        AttributeReading {
            id: id.clone(),
            attribute,
            value,
            error,
        }
    }))
    .await;

    debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Fetched attributes");
    readings
}

#[cfg(test)]
mod tests {
    use super::*;

    const CELL: &str = concat!(
        "urn:3gpp:dn:SubNetwork=Europe,SubNetwork=Ireland,MeContext=NR03,",
        "ManagedElement=NR03,GNBDUFunction=1,NRCellDU=NR03-1"
    );

    struct OnlyFirstCell;

    #[async_trait]
    impl AttributeApi for OnlyFirstCell {
        async fn get_attribute(
            &self,
            identifier: &str,
            _attribute: Attribute,
        ) -> Result<Option<String>, PlatformError> {
            if identifier == "A" {
                Ok(Some("ENABLED".into()))
            } else {
                Err(PlatformError::Status { status: 500, body: "boom".into() })
            }
        }
    }

    #[test]
    fn target_splits_at_the_managed_element() {
        let target = ncmp_target(CELL).unwrap();
        assert_eq!(target.resource_identifier, "/GNBDUFunction[@id=1]/NRCellDU[@id=NR03-1]");

        let digest = Sha256::digest(
            b"SubNetwork=Europe,SubNetwork=Ireland,MeContext=NR03,ManagedElement=NR03",
        );
        assert_eq!(target.cm_handle, hex::encode_upper(&digest[..16]));
        assert_eq!(target.cm_handle.len(), 32);
    }

    #[test]
    fn target_rejects_fdns_without_a_cell_below_the_element() {
        assert!(ncmp_target("urn:3gpp:dn:SubNetwork=Europe,NRCellDU=1").is_err());
        assert!(ncmp_target("urn:3gpp:dn:SubNetwork=Europe,ManagedElement=ME1").is_err());
        assert!(ncmp_target("urn:3gpp:dn:garbage").is_err());
    }

    #[tokio::test]
    async fn failed_reads_become_none_without_failing_the_batch() {
        let ids = vec!["A".to_string(), "B".to_string()];
        let readings =
            get_attributes_for_ids(&OnlyFirstCell, &ids, Attribute::OperationalState).await;

        assert_eq!(readings[0].value.as_deref(), Some("ENABLED"));
        assert_eq!(readings[0].error, None);
        assert_eq!(readings[1].value, None);
        match &readings[1].error {
            Some(PipelineError::PerItem(cause)) => assert!(cause.contains("'B'")),
            other => panic!("expected a per-item error, got {other:?}"),
        }
        assert_eq!(
            readings[1].to_json(),
            serde_json::json!({"id": "B", "operationalState": null})
        );
    }
}
