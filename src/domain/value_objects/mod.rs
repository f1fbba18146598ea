pub mod collection;
pub mod credential;
pub mod retry_policy;
pub mod scan_result;
pub mod sync_queue_id;
pub mod sync_queue_status;

pub use collection::Collection;
pub use credential::Credential;
pub use retry_policy::{
    RetryPolicy, SYNC_RETRY_BACKOFF_FACTOR, SYNC_RETRY_DELAY_MS, SYNC_RETRY_MAX,
};
pub use scan_result::ScanResult;
pub use sync_queue_id::SyncQueueId;
pub use sync_queue_status::SyncQueueStatus;
