use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::value_objects::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub sync: SyncConfig,
    pub monitor: MonitorConfig,
    pub scanner: ScannerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    pub retry_max: u32,
    pub retry_delay_ms: u64,
    pub retry_backoff_factor: f64,
    pub flush_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    pub health_check_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub scanner_id: String,
    pub device_info: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://eventdesk.db".to_string(),
                max_connections: 5,
            },
            gateway: GatewayConfig {
                base_url: "http://localhost:8080/api".to_string(),
                auth_token: None,
                request_timeout_ms: 10_000,
            },
            sync: SyncConfig {
                auto_sync: true,
                retry_max: 5,
                retry_delay_ms: 1000,
                retry_backoff_factor: 2.0,
                flush_interval_secs: 30,
            },
            monitor: MonitorConfig {
                poll_interval_ms: 2000,
                health_check_interval_ms: 5000,
            },
            scanner: ScannerConfig {
                scanner_id: "scanner-1".to_string(),
                device_info: format!("eventdesk/{} ({})", env!("CARGO_PKG_VERSION"), std::env::consts::OS),
            },
        }
    }
}

impl SyncConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max,
            self.retry_delay_ms,
            self.retry_backoff_factor,
        )
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("EVENTDESK_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Some(value) = env_u64("EVENTDESK_DB_MAX_CONNECTIONS") {
            cfg.database.max_connections = value.clamp(1, u32::MAX as u64) as u32;
        }

        if let Ok(v) = std::env::var("EVENTDESK_GATEWAY_URL") {
            if !v.trim().is_empty() {
                cfg.gateway.base_url = v.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(v) = std::env::var("EVENTDESK_GATEWAY_TOKEN") {
            let token = v.trim();
            cfg.gateway.auth_token = if token.is_empty() {
                None
            } else {
                Some(token.to_string())
            };
        }
        if let Some(value) = env_u64("EVENTDESK_GATEWAY_TIMEOUT_MS") {
            cfg.gateway.request_timeout_ms = value.max(1);
        }

        if let Ok(v) = std::env::var("EVENTDESK_SYNC_AUTO") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(value) = env_u64("EVENTDESK_SYNC_RETRY_MAX") {
            cfg.sync.retry_max = value.clamp(1, u32::MAX as u64) as u32;
        }
        if let Some(value) = env_u64("EVENTDESK_SYNC_RETRY_DELAY_MS") {
            cfg.sync.retry_delay_ms = value;
        }
        if let Ok(v) = std::env::var("EVENTDESK_SYNC_RETRY_BACKOFF_FACTOR") {
            if let Some(value) = parse_f64(&v) {
                cfg.sync.retry_backoff_factor = value.max(1.0);
            }
        }
        if let Some(value) = env_u64("EVENTDESK_SYNC_FLUSH_INTERVAL_SECS") {
            cfg.sync.flush_interval_secs = value;
        }

        if let Some(value) = env_u64("EVENTDESK_MONITOR_POLL_INTERVAL_MS") {
            cfg.monitor.poll_interval_ms = value.max(100);
        }
        if let Some(value) = env_u64("EVENTDESK_MONITOR_HEALTH_INTERVAL_MS") {
            cfg.monitor.health_check_interval_ms = value.max(100);
        }

        if let Ok(v) = std::env::var("EVENTDESK_SCANNER_ID") {
            if !v.trim().is_empty() {
                cfg.scanner.scanner_id = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("EVENTDESK_DEVICE_INFO") {
            if !v.trim().is_empty() {
                cfg.scanner.device_info = v.trim().to_string();
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.gateway.base_url.trim().is_empty() {
            return Err("Gateway base_url must not be empty".to_string());
        }
        if self.gateway.request_timeout_ms == 0 {
            return Err("Gateway request_timeout_ms must be greater than 0".to_string());
        }
        if self.sync.retry_max == 0 {
            return Err("Sync retry_max must be greater than 0".to_string());
        }
        if !self.sync.retry_backoff_factor.is_finite() || self.sync.retry_backoff_factor < 1.0 {
            return Err("Sync retry_backoff_factor must be at least 1.0".to_string());
        }
        if self.monitor.poll_interval_ms == 0 {
            return Err("Monitor poll_interval_ms must be greater than 0".to_string());
        }
        if self.scanner.scanner_id.trim().is_empty() {
            return Err("Scanner scanner_id must not be empty".to_string());
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

fn parse_f64(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok()
}
