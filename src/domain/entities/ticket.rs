use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local mirror of a ticket owned by the remote gateway. `scanned` is only ever
/// changed remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub event_id: String,
    pub ticket_type_id: String,
    pub buyer_name: String,
    pub buyer_email: String,
    #[serde(default)]
    pub buyer_phone: String,
    pub qr_payload: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub scanned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanned_at: Option<DateTime<Utc>>,
}
