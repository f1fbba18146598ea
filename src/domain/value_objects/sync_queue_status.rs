use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncQueueStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncQueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncQueueStatus::Pending => "pending",
            SyncQueueStatus::Synced => "synced",
            SyncQueueStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncQueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
