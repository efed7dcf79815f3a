//! Request/response DTOs and JSON mapping helpers.

use serde_json::Value;

use recordstore_core::RecordId;
use recordstore_infra::records::Record;

#[derive(Debug, serde::Deserialize)]
pub struct CreateRecordRequest {
    /// Client-supplied id; one is generated when absent.
    #[serde(default)]
    pub id: Option<RecordId>,
    pub data: Value,
}

#[derive(Debug, serde::Deserialize)]
pub struct UpdateRecordRequest {
    pub data: Value,
}

pub fn record_to_json(record: &Record) -> Value {
    serde_json::json!({
        "id": record.id.to_string(),
        "data": record.data,
    })
}
