use crate::application::services::sync_queue_service::{FlushReport, SyncQueueService};
use crate::shared::error::AppError;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub is_online: bool,
    pub pending_count: usize,
    pub failed_count: usize,
    pub last_polled_at: Option<i64>,
}

/// Online/offline state plus the queue counts shown to the user.
///
/// Connectivity signals arrive on a `watch` channel; an offline→online edge
/// triggers a queue flush. Counts are re-read from the store on a fixed
/// interval so missed signals or writes from another process still show up.
pub struct NetworkStatusMonitor {
    queue: Arc<SyncQueueService>,
    status: RwLock<NetworkStatus>,
}

impl NetworkStatusMonitor {
    pub fn new(queue: Arc<SyncQueueService>, initially_online: bool) -> Self {
        Self {
            queue,
            status: RwLock::new(NetworkStatus {
                is_online: initially_online,
                ..NetworkStatus::default()
            }),
        }
    }

    pub async fn is_online(&self) -> bool {
        self.status.read().await.is_online
    }

    pub async fn pending_count(&self) -> usize {
        self.status.read().await.pending_count
    }

    pub async fn snapshot(&self) -> NetworkStatus {
        *self.status.read().await
    }

    /// Records a connectivity signal. Returns the flush report when the signal
    /// was an offline→online transition.
    pub async fn handle_transition(&self, online: bool) -> Option<FlushReport> {
        if !self.apply_transition(online).await {
            return None;
        }
        self.flush_after_reconnect().await
    }

    async fn flush_after_reconnect(&self) -> Option<FlushReport> {
        match self.queue.flush().await {
            Ok(report) => {
                self.refresh_counts_logged().await;
                Some(report)
            }
            Err(err) => {
                tracing::error!(
                    target: "sync::monitor",
                    error = %err,
                    "flush after reconnect failed"
                );
                None
            }
        }
    }

    pub async fn refresh_counts(&self) -> Result<NetworkStatus, AppError> {
        let counts = self.queue.counts().await?;
        let mut status = self.status.write().await;
        status.pending_count = counts.pending;
        status.failed_count = counts.failed;
        status.last_polled_at = Some(Utc::now().timestamp_millis());
        Ok(*status)
    }

    /// Spawns the signal/poll loop; it stops when `cancel` fires or the signal
    /// sender is dropped.
    pub fn spawn(
        self: Arc<Self>,
        mut signals: watch::Receiver<bool>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let initial = *signals.borrow_and_update();
            self.handle_signal(initial).await;

            let mut poll = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    changed = signals.changed() => {
                        if changed.is_err() {
                            tracing::debug!(target: "sync::monitor", "connectivity source closed");
                            break;
                        }
                        let online = *signals.borrow_and_update();
                        self.handle_signal(online).await;
                    }
                    _ = poll.tick() => self.refresh_counts_logged().await,
                }
            }
        })
    }

    // 状態は即座に反映し、フラッシュは別タスクで実行してポーリングを止めない
    async fn handle_signal(self: &Arc<Self>, online: bool) {
        if !self.apply_transition(online).await {
            return;
        }
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            monitor.flush_after_reconnect().await;
        });
    }

    async fn apply_transition(&self, online: bool) -> bool {
        let mut status = self.status.write().await;
        let was_online = status.is_online;
        status.is_online = online;
        drop(status);

        match (was_online, online) {
            (false, true) => {
                tracing::info!(target: "sync::monitor", "connectivity restored");
                true
            }
            (true, false) => {
                tracing::info!(target: "sync::monitor", "connectivity lost");
                false
            }
            _ => false,
        }
    }

    async fn refresh_counts_logged(&self) {
        if let Err(err) = self.refresh_counts().await {
            tracing::warn!(
                target: "sync::monitor",
                error = %err,
                "failed to refresh sync queue counts"
            );
        }
    }
}
