pub mod health_probe;
pub mod http_gateway;
pub mod offline_gateway;

pub use health_probe::{HealthCheck, spawn_health_probe};
pub use http_gateway::HttpRemoteGateway;
pub use offline_gateway::OfflineAwareGateway;
