pub mod channel_device;

pub use channel_device::{ChannelCaptureDevice, Frame};
