use crate::application::ports::{FlushScheduler, ManualFlush, MirrorStore, RemoteGateway};
use crate::application::services::{NetworkStatusMonitor, ScanPipeline, SyncQueueService};
use crate::infrastructure::capture::{ChannelCaptureDevice, Frame};
use crate::infrastructure::database::ConnectionPool;
use crate::infrastructure::gateway::{HttpRemoteGateway, OfflineAwareGateway, spawn_health_probe};
use crate::infrastructure::storage::SqliteMirrorStore;
use crate::infrastructure::sync::{ChannelFlushScheduler, spawn_flush_driver};
use crate::shared::config::AppConfig;
use crate::shared::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CAPTURE_BUFFER: usize = 16;

/// アプリケーション全体の状態を管理する構造体
pub struct AppState {
    pub config: AppConfig,
    pub pool: ConnectionPool,
    pub store: Arc<dyn MirrorStore>,
    pub gateway: Arc<dyn RemoteGateway>,
    pub sync_queue: Arc<SyncQueueService>,
    pub network_monitor: Arc<NetworkStatusMonitor>,
    pub scan_pipeline: Arc<ScanPipeline>,
    health_target: Option<Arc<HttpRemoteGateway>>,
    online_tx: watch::Sender<bool>,
    capture_tx: mpsc::Sender<Frame>,
    flush_requests: Mutex<Option<mpsc::UnboundedReceiver<Duration>>>,
    cancel: CancellationToken,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AppState {
    /// Wires everything against the configured HTTP gateway.
    pub async fn new(config: AppConfig) -> Result<Self, AppError> {
        let http = Arc::new(HttpRemoteGateway::new(&config.gateway)?);
        let remote: Arc<dyn RemoteGateway> = http.clone();
        Self::build(config, remote, Some(http)).await
    }

    /// Wires everything against a caller-supplied gateway; no health probe runs.
    pub async fn with_gateway(
        config: AppConfig,
        remote: Arc<dyn RemoteGateway>,
    ) -> Result<Self, AppError> {
        Self::build(config, remote, None).await
    }

    async fn build(
        config: AppConfig,
        remote: Arc<dyn RemoteGateway>,
        health_target: Option<Arc<HttpRemoteGateway>>,
    ) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;

        let pool = ConnectionPool::new(&config.database.url, config.database.max_connections)
            .await?;
        pool.migrate().await?;
        let store: Arc<dyn MirrorStore> = Arc::new(SqliteMirrorStore::new(pool.clone()));

        let (online_tx, online_rx) = watch::channel(true);
        let gateway: Arc<dyn RemoteGateway> =
            Arc::new(OfflineAwareGateway::new(remote, online_rx));

        // 自動同期が無効なら明示的な flush のみ
        let (scheduler, flush_requests) = if config.sync.auto_sync {
            let (scheduler, rx) = ChannelFlushScheduler::channel();
            (Arc::new(scheduler) as Arc<dyn FlushScheduler>, Some(rx))
        } else {
            (Arc::new(ManualFlush) as Arc<dyn FlushScheduler>, None)
        };

        let sync_queue = Arc::new(SyncQueueService::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            scheduler,
            config.sync.retry_policy(),
        ));
        let network_monitor = Arc::new(NetworkStatusMonitor::new(Arc::clone(&sync_queue), true));

        let (device, capture_tx) = ChannelCaptureDevice::new(CAPTURE_BUFFER);
        let scan_pipeline = Arc::new(ScanPipeline::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
            Arc::clone(&sync_queue),
            Arc::new(device),
            config.scanner.scanner_id.clone(),
            config.scanner.device_info.clone(),
        ));

        tracing::info!(
            database = %config.database.url,
            gateway = %config.gateway.base_url,
            auto_sync = config.sync.auto_sync,
            "application state initialized"
        );

        Ok(Self {
            config,
            pool,
            store,
            gateway,
            sync_queue,
            network_monitor,
            scan_pipeline,
            health_target,
            online_tx,
            capture_tx,
            flush_requests: Mutex::new(flush_requests),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Starts the flush driver, the network monitor and, when backed by the
    /// HTTP gateway, the health probe. Only the first call starts anything;
    /// it returns whether this call did.
    pub fn start_background_tasks(&self) -> bool {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("background tasks already running");
            return false;
        }

        let mut handles = Vec::new();

        let requests = self
            .flush_requests
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(requests) = requests {
            let periodic = match self.config.sync.flush_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            };
            handles.push(spawn_flush_driver(
                Arc::clone(&self.sync_queue),
                requests,
                periodic,
                self.cancel.child_token(),
            ));
        }

        handles.push(Arc::clone(&self.network_monitor).spawn(
            self.online_tx.subscribe(),
            self.config.monitor.poll_interval(),
            self.cancel.child_token(),
        ));

        if let Some(target) = &self.health_target {
            handles.push(spawn_health_probe(
                target.clone(),
                self.online_tx.clone(),
                self.config.monitor.health_check_interval(),
                self.cancel.child_token(),
            ));
        }

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.extend(handles);
        }
        true
    }

    /// Publishes a connectivity signal from the host environment.
    pub fn set_online(&self, online: bool) {
        self.online_tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
    }

    pub fn is_online(&self) -> bool {
        *self.online_tx.borrow()
    }

    /// Sender for credentials decoded outside this crate (camera bridge,
    /// keyboard wedge).
    pub fn capture_frames(&self) -> mpsc::Sender<Frame> {
        self.capture_tx.clone()
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles = self
            .tasks
            .lock()
            .map(|mut tasks| std::mem::take(&mut *tasks))
            .unwrap_or_default();
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "background task ended abnormally");
            }
        }
        self.pool.close().await;
        tracing::info!("application state shut down");
    }
}
