#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eventdesk_lib::{
    AppError, ConnectionPool, FlushScheduler, MirrorStore, RemoteGateway, RetryPolicy, ScanLog,
    ScanResult, SqliteMirrorStore, SyncAction, SyncQueueService,
};

pub async fn setup_store() -> (ConnectionPool, Arc<dyn MirrorStore>) {
    let pool = ConnectionPool::from_memory()
        .await
        .expect("in-memory sqlite");
    pool.migrate().await.expect("migrations");
    let store: Arc<dyn MirrorStore> = Arc::new(SqliteMirrorStore::new(pool.clone()));
    (pool, store)
}

pub fn build_queue(
    store: Arc<dyn MirrorStore>,
    gateway: Arc<FakeGateway>,
    scheduler: Arc<RecordingScheduler>,
) -> Arc<SyncQueueService> {
    Arc::new(SyncQueueService::new(
        store,
        gateway,
        scheduler,
        RetryPolicy::default(),
    ))
}

/// Remote gateway with just enough state to classify scans and count
/// deliveries.
#[derive(Default)]
pub struct FakeGateway {
    tickets: Mutex<HashMap<String, TicketState>>,
    offline: AtomicBool,
    unauthorized: AtomicBool,
    failures_remaining: AtomicU32,
    apply_calls: AtomicUsize,
    scan_calls: AtomicUsize,
    applied: Mutex<Vec<SyncAction>>,
}

#[derive(Clone)]
struct TicketState {
    ticket_id: String,
    scanned: bool,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ticket(self, qr_payload: &str, ticket_id: &str) -> Self {
        if let Ok(mut tickets) = self.tickets.lock() {
            tickets.insert(
                qr_payload.to_string(),
                TicketState {
                    ticket_id: ticket_id.to_string(),
                    scanned: false,
                },
            );
        }
        self
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_unauthorized(&self, unauthorized: bool) {
        self.unauthorized.store(unauthorized, Ordering::SeqCst);
    }

    /// The next `count` deliveries fail with a network error.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn applied(&self) -> Vec<SyncAction> {
        self.applied.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn is_scanned(&self, qr_payload: &str) -> bool {
        self.tickets
            .lock()
            .ok()
            .and_then(|tickets| tickets.get(qr_payload).map(|t| t.scanned))
            .unwrap_or(false)
    }

    fn check_link(&self) -> Result<(), AppError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Network("gateway unreachable".into()));
        }
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(AppError::Unauthorized("session expired".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn scan_ticket(&self, qr_payload: &str, scanner_id: &str) -> Result<ScanLog, AppError> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        self.check_link()?;

        let mut tickets = self
            .tickets
            .lock()
            .map_err(|_| AppError::Internal("poisoned".into()))?;
        let (result, ticket_id) = match tickets.get_mut(qr_payload) {
            None => (ScanResult::Invalid, None),
            Some(state) if state.scanned => (ScanResult::Duplicate, Some(state.ticket_id.clone())),
            Some(state) => {
                state.scanned = true;
                (ScanResult::Valid, Some(state.ticket_id.clone()))
            }
        };

        Ok(ScanLog {
            id: format!("scan-{}", self.scan_calls.load(Ordering::SeqCst)),
            ticket_id,
            scanner_id: scanner_id.to_string(),
            timestamp: Utc::now(),
            result,
            device_info: String::new(),
            error_message: None,
            synced: true,
        })
    }

    async fn apply(&self, action: &SyncAction) -> Result<(), AppError> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        self.check_link()?;

        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::Network("503 Service Unavailable".into()));
        }

        if let Ok(mut applied) = self.applied.lock() {
            applied.push(action.clone());
        }
        Ok(())
    }
}

/// Captures requested flush delays instead of running timers.
#[derive(Default)]
pub struct RecordingScheduler {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Non-zero delays only, i.e. backoff timers.
    pub fn backoff_ms(&self) -> Vec<u64> {
        self.delays()
            .into_iter()
            .filter(|d| !d.is_zero())
            .map(|d| d.as_millis() as u64)
            .collect()
    }
}

impl FlushScheduler for RecordingScheduler {
    fn schedule_flush(&self, delay: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(delay);
        }
    }
}
