//! Schema Registry: Avro schemas by id.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{PlatformClient, PlatformError, SchemaSource};

#[derive(Debug, Deserialize)]
struct SchemaResponse {
    schema: Value,
}

#[async_trait]
impl SchemaSource for PlatformClient {
    async fn get_schema_by_id(&self, schema_id: &str) -> Result<String, PlatformError> {
        let path = format!("schema-registry-sr/view/schemas/ids/{schema_id}");
        let response: SchemaResponse = self.api.get_json(&path, &[]).await?;
        // The registry returns the schema as an embedded JSON string, but a
        // bare object parses just as well.
        Ok(match response.schema {
            Value::String(text) => text,
            other => other.to_string(),
        })
    }
}
