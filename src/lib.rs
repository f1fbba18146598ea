//! Offline-first core of the EventDesk dashboard: a durable local mirror, a
//! retrying sync queue towards the remote gateway, ticket scan validation and
//! connectivity monitoring.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::ports::{
    CaptureDevice, CaptureError, CaptureStream, FlushScheduler, ManualFlush, MirrorStore,
    RemoteGateway,
};
pub use application::services::{
    FlushReport, NetworkStatus, NetworkStatusMonitor, QueueCounts, ScanOutcome, ScanPhase,
    ScanPipeline, ScanSession, SessionOutcome, SyncQueueService,
};
pub use domain::entities::{EventRecord, ScanLog, SyncAction, SyncQueueItem, Ticket};
pub use domain::value_objects::{
    Collection, RetryPolicy, ScanResult, SyncQueueId, SyncQueueStatus,
};
pub use infrastructure::database::ConnectionPool;
pub use infrastructure::storage::SqliteMirrorStore;
pub use shared::{AppConfig, AppError, Result};
pub use state::AppState;

/// Default filter when `RUST_LOG` is unset. Subsystems log under their own
/// targets (`sync::queue`, `scan::pipeline`, ...), not the crate path.
pub const DEFAULT_LOG_FILTER: &str =
    "eventdesk=debug,sync=debug,scan=debug,gateway=debug,store=debug,info";

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
