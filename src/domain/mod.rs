pub mod entities;
pub mod value_objects;

pub use entities::{EventRecord, ScanLog, SyncAction, SyncQueueItem, Ticket};
pub use value_objects::{Collection, ScanResult, SyncQueueId, SyncQueueStatus};
