//! # Avro Message Decoding
//!
//! Payloads on the PM-counter topic are schema-registry framed: a 5-byte
//! prefix (magic byte plus 4-byte schema id) followed by a plain Avro datum.
//! The schema id travels in a header as well, so the prefix is skipped
//! rather than parsed.

use apache_avro::{from_avro_datum, Schema};
use serde_json::{Map, Value as JsonValue};

use crate::core::PipelineError;

/// Length of the framing prefix in front of every datum.
pub const AVRO_MAGIC_BYTE_COUNT: usize = 5;

/// A decoded record with its fields as JSON values.
pub type DecodedRecord = Map<String, JsonValue>;

/// Strips the framing prefix and decodes the rest against `schema`.
///
/// # Errors
/// `PipelineError::Decode`, naming `schema_id`, for short payloads, datums
/// that do not match the schema, and non-record schemas.
pub fn decode_message(
    raw: &[u8],
    schema: &Schema,
    schema_id: &str,
) -> Result<DecodedRecord, PipelineError> {
    let mut datum = raw.get(AVRO_MAGIC_BYTE_COUNT..).ok_or_else(|| {
        PipelineError::Decode(format!(
            "payload of {} bytes is shorter than the Avro framing prefix",
            raw.len()
        ))
    })?;

    let value = from_avro_datum(schema, &mut datum, None).map_err(|e| {
        PipelineError::Decode(format!("Avro decode error for schema ID {schema_id}: {e}"))
    })?;

    match JsonValue::try_from(value) {
        Ok(JsonValue::Object(record)) => Ok(record),
        Ok(other) => Err(PipelineError::Decode(format!(
            "Avro datum for schema ID {schema_id} is not a record: {other}"
        ))),
        Err(e) => Err(PipelineError::Decode(format!(
            "Avro value for schema ID {schema_id} has no JSON form: {e}"
        ))),
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn decodes_after_stripping_the_prefix() {
        let raw = pm_payload(
            "SubNetwork=Europe",
            "ManagedElement=A,GNBDUFunction=1,NRCellDU=A-1",
            true,
        );
        let record = decode_message(&raw, &pm_schema(), "7").unwrap();

        assert_eq!(record["dnPrefix"], "SubNetwork=Europe");
        assert_eq!(record["moFdn"], "ManagedElement=A,GNBDUFunction=1,NRCellDU=A-1");
        assert_eq!(record["pmCounters"]["pmMacVolDl"], 42);
    }

    #[test]
    fn null_counters_decode_to_json_null() {
        let raw = pm_payload("SubNetwork=Europe", "ManagedElement=A", false);
        let record = decode_message(&raw, &pm_schema(), "7").unwrap();
        assert!(record["pmCounters"].is_null());
    }

    #[test]
    fn short_and_mismatched_payloads_are_decode_errors() {
        assert!(matches!(
            decode_message(&[0, 0, 0], &pm_schema(), "7"),
            Err(PipelineError::Decode(_))
        ));

        let other = Schema::parse_str(
            r#"{"type":"record","name":"R","fields":[{"name":"n","type":"long"}]}"#,
        )
        .unwrap();
        let mut raw = vec![0u8; AVRO_MAGIC_BYTE_COUNT];
        raw.push(0x80); // unterminated varint
        match decode_message(&raw, &other, "8") {
            Err(PipelineError::Decode(cause)) => assert!(cause.contains("schema ID 8")),
            other => panic!("expected a decode error, got {other:?}"),
        }
    }

    #[test]
    fn non_record_schema_is_a_decode_error() {
        let schema = Schema::parse_str(r#""long""#).unwrap();
        let mut raw = vec![0u8; AVRO_MAGIC_BYTE_COUNT];
        raw.push(0x02);
        assert!(matches!(
            decode_message(&raw, &schema, "9"),
            Err(PipelineError::Decode(_))
        ));
    }
}
