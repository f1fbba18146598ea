use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Synced,
    Retrying,
    Failed,
    Deferred,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsSnapshot {
    pub total_synced: u64,
    pub total_failure: u64,
    pub total_exhausted: u64,
    pub consecutive_failure: u64,
    pub last_success_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
    pub last_outcome: Option<DeliveryOutcome>,
    pub last_item_id: Option<String>,
    pub last_action: Option<String>,
    pub last_retries: Option<u32>,
    pub last_backoff_ms: Option<u64>,
}

#[derive(Default, Clone)]
struct LastDelivery {
    outcome: Option<DeliveryOutcome>,
    item_id: Option<String>,
    action: Option<String>,
    retries: Option<u32>,
    backoff_ms: Option<u64>,
}

/// Delivery counters for one sync queue.
pub struct SyncMetrics {
    synced: AtomicU64,
    failure: AtomicU64,
    exhausted: AtomicU64,
    consecutive_failure: AtomicU64,
    last_success_ms: AtomicU64,
    last_failure_ms: AtomicU64,
    last: Mutex<LastDelivery>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            synced: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            exhausted: AtomicU64::new(0),
            consecutive_failure: AtomicU64::new(0),
            last_success_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            last: Mutex::new(LastDelivery::default()),
        }
    }

    pub fn record(
        &self,
        outcome: DeliveryOutcome,
        item_id: &str,
        action: &str,
        retries: u32,
        backoff_ms: Option<u64>,
    ) {
        match outcome {
            DeliveryOutcome::Synced => {
                self.synced.fetch_add(1, Ordering::Relaxed);
                self.last_success_ms
                    .store(current_unix_ms(), Ordering::Relaxed);
                self.consecutive_failure.store(0, Ordering::Relaxed);
            }
            DeliveryOutcome::Retrying | DeliveryOutcome::Failed | DeliveryOutcome::Deferred => {
                self.failure.fetch_add(1, Ordering::Relaxed);
                self.last_failure_ms
                    .store(current_unix_ms(), Ordering::Relaxed);
                self.consecutive_failure.fetch_add(1, Ordering::Relaxed);
                if outcome == DeliveryOutcome::Failed {
                    self.exhausted.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if let Ok(mut guard) = self.last.lock() {
            guard.outcome = Some(outcome);
            guard.item_id = Some(item_id.to_string());
            guard.action = Some(action.to_string());
            guard.retries = Some(retries);
            guard.backoff_ms = backoff_ms;
        }
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        let last = self
            .last
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();

        SyncMetricsSnapshot {
            total_synced: self.synced.load(Ordering::Relaxed),
            total_failure: self.failure.load(Ordering::Relaxed),
            total_exhausted: self.exhausted.load(Ordering::Relaxed),
            consecutive_failure: self.consecutive_failure.load(Ordering::Relaxed),
            last_success_ms: to_option(self.last_success_ms.load(Ordering::Relaxed)),
            last_failure_ms: to_option(self.last_failure_ms.load(Ordering::Relaxed)),
            last_outcome: last.outcome,
            last_item_id: last.item_id,
            last_action: last.action,
            last_retries: last.retries,
            last_backoff_ms: last.backoff_ms,
        }
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn to_option(value: u64) -> Option<u64> {
    if value == 0 { None } else { Some(value) }
}

fn current_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_consecutive_failures() {
        let metrics = SyncMetrics::new();
        metrics.record(DeliveryOutcome::Retrying, "q-1", "save_record", 1, Some(2000));
        metrics.record(DeliveryOutcome::Retrying, "q-1", "save_record", 2, Some(4000));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_failure, 2);
        assert_eq!(snapshot.consecutive_failure, 2);
        assert_eq!(snapshot.last_backoff_ms, Some(4000));

        metrics.record(DeliveryOutcome::Synced, "q-1", "save_record", 2, None);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_synced, 1);
        assert_eq!(snapshot.consecutive_failure, 0);
        assert_eq!(snapshot.last_outcome, Some(DeliveryOutcome::Synced));
        assert!(snapshot.last_success_ms.is_some());
    }

    #[test]
    fn exhausted_items_are_counted_separately() {
        let metrics = SyncMetrics::new();
        metrics.record(DeliveryOutcome::Failed, "q-9", "record_scan", 5, None);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_exhausted, 1);
        assert_eq!(snapshot.total_failure, 1);
        assert_eq!(snapshot.last_item_id.as_deref(), Some("q-9"));
    }
}
