use crate::application::ports::{CaptureDevice, CaptureError, CaptureStream};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub type Frame = Result<String, CaptureError>;

type FrameSlot = Arc<Mutex<Option<mpsc::Receiver<Frame>>>>;

/// Capture device fed by an external decoder (camera bridge, keyboard wedge,
/// test harness) through a channel. Only one stream can hold the receiver.
#[derive(Clone)]
pub struct ChannelCaptureDevice {
    slot: FrameSlot,
}

impl ChannelCaptureDevice {
    pub fn new(buffer: usize) -> (Self, mpsc::Sender<Frame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                slot: Arc::new(Mutex::new(Some(rx))),
            },
            tx,
        )
    }

    pub fn is_open(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.is_none())
            .unwrap_or(true)
    }
}

#[async_trait]
impl CaptureDevice for ChannelCaptureDevice {
    async fn open(&self) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| CaptureError::Unavailable("capture slot poisoned".to_string()))?;
        let rx = slot.take().ok_or(CaptureError::Busy)?;
        Ok(Box::new(ChannelCaptureStream {
            slot: Arc::clone(&self.slot),
            rx: Some(rx),
        }))
    }
}

struct ChannelCaptureStream {
    slot: FrameSlot,
    rx: Option<mpsc::Receiver<Frame>>,
}

#[async_trait]
impl CaptureStream for ChannelCaptureStream {
    async fn next_decoded(&mut self) -> Result<Option<String>, CaptureError> {
        let Some(rx) = self.rx.as_mut() else {
            return Ok(None);
        };
        match rx.recv().await {
            Some(frame) => frame.map(Some),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        if let Some(rx) = self.rx.take() {
            if let Ok(mut slot) = self.slot.lock() {
                *slot = Some(rx);
            }
        }
    }
}

impl Drop for ChannelCaptureStream {
    fn drop(&mut self) {
        self.close();
    }
}
