pub mod capture_device;
pub mod flush_scheduler;
pub mod mirror_store;
pub mod remote_gateway;

pub use capture_device::{CaptureDevice, CaptureError, CaptureStream};
pub use flush_scheduler::{FlushScheduler, ManualFlush};
pub use mirror_store::MirrorStore;
pub use remote_gateway::RemoteGateway;
