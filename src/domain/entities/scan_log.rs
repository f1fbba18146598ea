use crate::domain::value_objects::ScanResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One scan attempt and its classification. `result` is fixed when the log is
/// created; only `synced` changes afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanLog {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    pub scanner_id: String,
    pub timestamp: DateTime<Utc>,
    pub result: ScanResult,
    #[serde(default)]
    pub device_info: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub synced: bool,
}

impl ScanLog {
    /// Builds the log recorded locally when the gateway could not classify a scan.
    pub fn transport_error(scanner_id: &str, device_info: &str, message: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ticket_id: None,
            scanner_id: scanner_id.to_string(),
            timestamp: Utc::now(),
            result: ScanResult::Error,
            device_info: device_info.to_string(),
            error_message: Some(message),
            synced: false,
        }
    }

    pub fn into_synced(self) -> Self {
        Self {
            synced: true,
            ..self
        }
    }
}
