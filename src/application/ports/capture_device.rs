use crate::shared::error::AppError;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Capture device is already in use")]
    Busy,

    #[error("Capture device unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to decode frame: {0}")]
    Decode(String),
}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::Busy => AppError::ValidationError(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Camera (or any other frame source) that yields decoded credential text.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn open(&self) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

#[async_trait]
pub trait CaptureStream: Send {
    /// Waits for the next decoded credential. `Ok(None)` means the stream ended.
    async fn next_decoded(&mut self) -> Result<Option<String>, CaptureError>;

    /// Releases the underlying device. Must be idempotent.
    fn close(&mut self);
}
