pub mod event_record;
pub mod scan_log;
pub mod sync_action;
pub mod sync_queue_item;
pub mod ticket;

pub use event_record::EventRecord;
pub use scan_log::ScanLog;
pub use sync_action::SyncAction;
pub use sync_queue_item::{FailureOutcome, SyncQueueItem};
pub use ticket::Ticket;
