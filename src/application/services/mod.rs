pub mod network_monitor;
pub mod scan_pipeline;
pub mod sync_metrics;
pub mod sync_queue_service;

pub use network_monitor::{NetworkStatus, NetworkStatusMonitor};
pub use scan_pipeline::{ScanOutcome, ScanPhase, ScanPipeline, ScanSession, SessionOutcome};
pub use sync_metrics::{DeliveryOutcome, SyncMetrics, SyncMetricsSnapshot};
pub use sync_queue_service::{FlushReport, QueueCounts, SyncQueueService};
