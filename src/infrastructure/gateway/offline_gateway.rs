use crate::application::ports::RemoteGateway;
use crate::domain::entities::{ScanLog, SyncAction};
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// Short-circuits every call with `Network` while the connectivity signal
/// reads offline, so no request is attempted without a link.
pub struct OfflineAwareGateway {
    inner: Arc<dyn RemoteGateway>,
    online: watch::Receiver<bool>,
}

impl OfflineAwareGateway {
    pub fn new(inner: Arc<dyn RemoteGateway>, online: watch::Receiver<bool>) -> Self {
        Self { inner, online }
    }

    fn ensure_online(&self) -> Result<(), AppError> {
        if *self.online.borrow() {
            Ok(())
        } else {
            Err(AppError::Network("Device is offline".to_string()))
        }
    }
}

#[async_trait]
impl RemoteGateway for OfflineAwareGateway {
    async fn scan_ticket(&self, qr_payload: &str, scanner_id: &str) -> Result<ScanLog, AppError> {
        self.ensure_online()?;
        self.inner.scan_ticket(qr_payload, scanner_id).await
    }

    async fn apply(&self, action: &SyncAction) -> Result<(), AppError> {
        self.ensure_online()?;
        self.inner.apply(action).await
    }
}
