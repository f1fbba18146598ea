use crate::domain::entities::ScanLog;
use crate::domain::value_objects::Collection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A mutation destined for the remote gateway.
///
/// Each variant carries exactly one payload shape. Queue items persist the
/// variant name in `action` and the fields in `payload`; the pair is decoded
/// back into a `SyncAction` before every delivery attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum SyncAction {
    SaveRecord {
        collection: Collection,
        record: Value,
    },
    DeleteRecord {
        collection: Collection,
        id: String,
    },
    #[serde(rename_all = "camelCase")]
    RecordScan { scan_log: ScanLog },
    UpdateSettings { settings: Value },
}

impl SyncAction {
    pub fn name(&self) -> &'static str {
        match self {
            SyncAction::SaveRecord { .. } => "save_record",
            SyncAction::DeleteRecord { .. } => "delete_record",
            SyncAction::RecordScan { .. } => "record_scan",
            SyncAction::UpdateSettings { .. } => "update_settings",
        }
    }

    /// `(action, payload)` の組から復元し、形を検証する。
    pub fn decode(action: &str, payload: &Value) -> Result<Self, String> {
        let mut envelope = Map::new();
        envelope.insert("action".to_string(), Value::String(action.to_string()));
        envelope.insert("payload".to_string(), payload.clone());

        let decoded: SyncAction = serde_json::from_value(Value::Object(envelope))
            .map_err(|err| format!("Malformed payload for action `{action}`: {err}"))?;
        decoded.validate()?;
        Ok(decoded)
    }

    /// Splits the action into the `(action, payload)` pair stored on a queue item.
    pub fn encode(&self) -> Result<(String, Value), String> {
        self.validate()?;
        let mut value =
            serde_json::to_value(self).map_err(|err| format!("Failed to encode action: {err}"))?;
        let payload = value
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or(Value::Null);
        Ok((self.name().to_string(), payload))
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            SyncAction::SaveRecord { collection, record } => {
                ensure_remote_collection(*collection)?;
                match record_id(record) {
                    Some(_) => Ok(()),
                    None => Err(format!(
                        "Record for `{collection}` must be an object with a non-empty string id"
                    )),
                }
            }
            SyncAction::DeleteRecord { collection, id } => {
                ensure_remote_collection(*collection)?;
                if id.trim().is_empty() {
                    return Err(format!("Delete on `{collection}` requires a record id"));
                }
                Ok(())
            }
            SyncAction::RecordScan { scan_log } => {
                if scan_log.id.trim().is_empty() {
                    return Err("Scan log id cannot be empty".to_string());
                }
                Ok(())
            }
            SyncAction::UpdateSettings { settings } => {
                if !settings.is_object() {
                    return Err("Settings payload must be a JSON object".to_string());
                }
                Ok(())
            }
        }
    }
}

pub(crate) fn record_id(record: &Value) -> Option<&str> {
    record
        .as_object()?
        .get("id")?
        .as_str()
        .filter(|id| !id.trim().is_empty())
}

fn ensure_remote_collection(collection: Collection) -> Result<(), String> {
    if collection.is_local_only() {
        return Err(format!("Collection `{collection}` is not synchronised"));
    }
    Ok(())
}
