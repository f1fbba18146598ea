use crate::application::ports::mirror_store::{load_all_records, load_record, save_record};
use crate::application::ports::{FlushScheduler, MirrorStore, RemoteGateway};
use crate::application::services::sync_metrics::{
    DeliveryOutcome, SyncMetrics, SyncMetricsSnapshot,
};
use crate::domain::entities::{FailureOutcome, ScanLog, SyncAction, SyncQueueItem};
use crate::domain::value_objects::{Collection, RetryPolicy, SyncQueueId, SyncQueueStatus};
use crate::shared::error::AppError;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Result of one `flush()` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub attempted: u32,
    pub synced: u32,
    pub retried: u32,
    pub failed: u32,
    pub deferred: u32,
    /// Another flush was already running and will make one more pass instead.
    pub coalesced: bool,
}

impl FlushReport {
    fn absorb(&mut self, other: FlushReport) {
        self.attempted += other.attempted;
        self.synced += other.synced;
        self.retried += other.retried;
        self.failed += other.failed;
        self.deferred += other.deferred;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    pub pending: usize,
    pub synced: usize,
    pub failed: usize,
}

#[derive(Default)]
struct FlushState {
    running: bool,
    rerun: bool,
}

/// Durable, retrying delivery of mutations to the remote gateway.
///
/// All queue state lives in the `sync-queue` collection of the mirror store and
/// is re-read on every call, so a restart between any two steps loses nothing:
/// pending items are simply picked up by the next flush.
pub struct SyncQueueService {
    store: Arc<dyn MirrorStore>,
    gateway: Arc<dyn RemoteGateway>,
    scheduler: Arc<dyn FlushScheduler>,
    policy: RetryPolicy,
    metrics: SyncMetrics,
    flush_state: Mutex<FlushState>,
}

impl SyncQueueService {
    pub fn new(
        store: Arc<dyn MirrorStore>,
        gateway: Arc<dyn RemoteGateway>,
        scheduler: Arc<dyn FlushScheduler>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            scheduler,
            policy,
            metrics: SyncMetrics::new(),
            flush_state: Mutex::new(FlushState::default()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn metrics(&self) -> SyncMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn enqueue(&self, action: SyncAction) -> Result<SyncQueueItem, AppError> {
        let item =
            SyncQueueItem::new_pending(&action, Utc::now()).map_err(AppError::ValidationError)?;
        save_record(self.store.as_ref(), Collection::SyncQueue, item.id.as_str(), &item).await?;

        tracing::info!(
            target: "sync::queue",
            id = %item.id,
            action = %item.action,
            "queued sync action"
        );
        self.scheduler.schedule_flush(Duration::ZERO);
        Ok(item)
    }

    /// Enqueues an action given by name, rejecting payloads that do not match
    /// the action's shape before anything is persisted.
    pub async fn enqueue_raw(
        &self,
        action: &str,
        payload: Value,
    ) -> Result<SyncQueueItem, AppError> {
        let action = SyncAction::decode(action, &payload).map_err(AppError::ValidationError)?;
        self.enqueue(action).await
    }

    /// Writes a record to the local mirror and queues it for the gateway.
    pub async fn save_and_enqueue(
        &self,
        collection: Collection,
        record: Value,
    ) -> Result<SyncQueueItem, AppError> {
        let action = SyncAction::SaveRecord {
            collection,
            record: record.clone(),
        };
        action.validate().map_err(AppError::ValidationError)?;
        let id = crate::domain::entities::sync_action::record_id(&record)
            .map(str::to_string)
            .ok_or_else(|| AppError::ValidationError("Record id is missing".to_string()))?;

        self.store.set(collection, &id, record).await?;
        self.enqueue(action).await
    }

    /// Removes a record from the local mirror and queues the remote delete.
    pub async fn delete_and_enqueue(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<SyncQueueItem, AppError> {
        let action = SyncAction::DeleteRecord {
            collection,
            id: id.to_string(),
        };
        action.validate().map_err(AppError::ValidationError)?;

        self.store.remove(collection, id).await?;
        self.enqueue(action).await
    }

    pub async fn flush(&self) -> Result<FlushReport, AppError> {
        let Some(mut guard) = FlushGuard::acquire(&self.flush_state) else {
            tracing::debug!(target: "sync::queue", "flush already running, coalescing");
            return Ok(FlushReport {
                coalesced: true,
                ..FlushReport::default()
            });
        };

        let mut report = FlushReport::default();
        loop {
            match self.flush_pass().await {
                Ok(pass) => report.absorb(pass),
                Err(err) => {
                    // 合流済みの flush 要求は失われないよう再スケジュールする
                    if guard.abandon() {
                        self.scheduler.schedule_flush(Duration::ZERO);
                    }
                    return Err(err);
                }
            }
            if !guard.take_rerun() {
                break;
            }
        }

        if report.attempted > 0 {
            tracing::info!(
                target: "sync::queue",
                attempted = report.attempted,
                synced = report.synced,
                retried = report.retried,
                failed = report.failed,
                deferred = report.deferred,
                "sync queue flushed"
            );
        }
        Ok(report)
    }

    async fn flush_pass(&self) -> Result<FlushReport, AppError> {
        let items: Vec<SyncQueueItem> =
            load_all_records(self.store.as_ref(), Collection::SyncQueue).await?;

        let mut report = FlushReport::default();
        for item in items.into_iter().filter(SyncQueueItem::is_pending) {
            self.deliver(item, &mut report).await?;
        }
        Ok(report)
    }

    async fn deliver(
        &self,
        mut item: SyncQueueItem,
        report: &mut FlushReport,
    ) -> Result<(), AppError> {
        report.attempted += 1;

        let action = match item.decode_action() {
            Ok(action) => action,
            Err(message) => {
                tracing::warn!(
                    target: "sync::queue",
                    id = %item.id,
                    action = %item.action,
                    error = %message,
                    "undeliverable sync payload"
                );
                item.mark_undeliverable(message, Utc::now());
                self.persist(&item).await?;
                self.record_metric(DeliveryOutcome::Failed, &item, None);
                report.failed += 1;
                return Ok(());
            }
        };

        match self.gateway.apply(&action).await {
            Ok(()) => {
                item.mark_synced(Utc::now());
                self.persist(&item).await?;
                if let SyncAction::RecordScan { scan_log } = &action {
                    self.mark_scan_synced(&scan_log.id).await?;
                }
                self.record_metric(DeliveryOutcome::Synced, &item, None);
                report.synced += 1;
            }
            Err(err) if err.is_auth() => {
                tracing::warn!(
                    target: "sync::queue",
                    id = %item.id,
                    error = %err,
                    "sync delivery rejected by session, deferring"
                );
                item.record_deferral(err.to_string(), Utc::now());
                self.persist(&item).await?;
                self.record_metric(DeliveryOutcome::Deferred, &item, None);
                report.deferred += 1;
            }
            Err(err) => match item.record_failure(err.to_string(), &self.policy, Utc::now()) {
                FailureOutcome::RetryAfter(delay) => {
                    tracing::warn!(
                        target: "sync::queue",
                        id = %item.id,
                        retries = item.retries,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "sync delivery failed, retry scheduled"
                    );
                    self.persist(&item).await?;
                    self.scheduler.schedule_flush(delay);
                    self.record_metric(
                        DeliveryOutcome::Retrying,
                        &item,
                        Some(delay.as_millis() as u64),
                    );
                    report.retried += 1;
                }
                FailureOutcome::Exhausted => {
                    tracing::error!(
                        target: "sync::queue",
                        id = %item.id,
                        retries = item.retries,
                        error = %err,
                        "sync delivery failed permanently"
                    );
                    self.persist(&item).await?;
                    self.record_metric(DeliveryOutcome::Failed, &item, None);
                    report.failed += 1;
                }
            },
        }

        Ok(())
    }

    /// 失敗したアイテムを手動で再試行する
    pub async fn retry(&self, item_id: &SyncQueueId) -> Result<FlushReport, AppError> {
        let mut item: SyncQueueItem =
            load_record(self.store.as_ref(), Collection::SyncQueue, item_id.as_str())
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Sync queue item {item_id}")))?;

        item.reset_for_retry(Utc::now())
            .map_err(AppError::ValidationError)?;
        self.persist(&item).await?;

        tracing::info!(target: "sync::queue", id = %item.id, "sync item reset for retry");
        self.flush().await
    }

    pub async fn clear_synced(&self) -> Result<usize, AppError> {
        let items = self.get_sync_queue().await?;
        let mut removed = 0;
        for item in items
            .iter()
            .filter(|item| item.status == SyncQueueStatus::Synced)
        {
            self.store
                .remove(Collection::SyncQueue, item.id.as_str())
                .await?;
            removed += 1;
        }

        tracing::info!(target: "sync::queue", removed, "cleared synced items");
        Ok(removed)
    }

    /// All queue items, oldest first.
    pub async fn get_sync_queue(&self) -> Result<Vec<SyncQueueItem>, AppError> {
        let mut items: Vec<SyncQueueItem> =
            load_all_records(self.store.as_ref(), Collection::SyncQueue).await?;
        items.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(items)
    }

    pub async fn counts(&self) -> Result<QueueCounts, AppError> {
        let items: Vec<SyncQueueItem> =
            load_all_records(self.store.as_ref(), Collection::SyncQueue).await?;
        let mut counts = QueueCounts::default();
        for item in &items {
            match item.status {
                SyncQueueStatus::Pending => counts.pending += 1,
                SyncQueueStatus::Synced => counts.synced += 1,
                SyncQueueStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    pub async fn pending_count(&self) -> Result<usize, AppError> {
        Ok(self.counts().await?.pending)
    }

    pub async fn failed_count(&self) -> Result<usize, AppError> {
        Ok(self.counts().await?.failed)
    }

    async fn persist(&self, item: &SyncQueueItem) -> Result<(), AppError> {
        save_record(self.store.as_ref(), Collection::SyncQueue, item.id.as_str(), item).await
    }

    async fn mark_scan_synced(&self, scan_log_id: &str) -> Result<(), AppError> {
        let existing: Option<ScanLog> =
            load_record(self.store.as_ref(), Collection::ScanLogs, scan_log_id).await?;
        if let Some(log) = existing {
            if !log.synced {
                save_record(
                    self.store.as_ref(),
                    Collection::ScanLogs,
                    scan_log_id,
                    &log.into_synced(),
                )
                .await?;
            }
        }
        Ok(())
    }

    fn record_metric(&self, outcome: DeliveryOutcome, item: &SyncQueueItem, backoff_ms: Option<u64>) {
        self.metrics.record(
            outcome,
            item.id.as_str(),
            &item.action,
            item.retries,
            backoff_ms,
        );
    }
}

/// Marks a flush as running; released on drop so an error or a cancelled
/// future never leaves the queue stuck in "running".
struct FlushGuard<'a> {
    state: &'a Mutex<FlushState>,
    armed: bool,
}

impl<'a> FlushGuard<'a> {
    fn acquire(state: &'a Mutex<FlushState>) -> Option<Self> {
        let mut guard = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.running {
            guard.rerun = true;
            return None;
        }
        guard.running = true;
        guard.rerun = false;
        Some(Self { state, armed: true })
    }

    /// Consumes a pending rerun request, or marks the flush finished.
    fn take_rerun(&mut self) -> bool {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.rerun {
            guard.rerun = false;
            return true;
        }
        guard.running = false;
        self.armed = false;
        false
    }

    /// Marks the flush finished after a failed pass. Returns whether another
    /// flush was requested in the meantime.
    fn abandon(&mut self) -> bool {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let rerun = std::mem::take(&mut guard.rerun);
        guard.running = false;
        self.armed = false;
        rerun
    }
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut guard = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.running = false;
            guard.rerun = false;
        }
    }
}
