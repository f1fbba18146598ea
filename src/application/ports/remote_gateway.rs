use crate::domain::entities::{ScanLog, SyncAction};
use crate::shared::error::AppError;
use async_trait::async_trait;

/// The authoritative backend.
///
/// Mutation endpoints must tolerate replays of the same action: the sync queue
/// delivers at least once. `Unauthorized` is reserved for rejected sessions,
/// `Network` for anything that should be retried.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn scan_ticket(&self, qr_payload: &str, scanner_id: &str) -> Result<ScanLog, AppError>;
    async fn apply(&self, action: &SyncAction) -> Result<(), AppError>;
}
