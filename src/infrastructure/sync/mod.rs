pub mod flush_driver;

pub use flush_driver::{ChannelFlushScheduler, spawn_flush_driver};
