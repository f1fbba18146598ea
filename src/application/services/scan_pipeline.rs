use crate::application::ports::mirror_store::{load_record, save_record};
use crate::application::ports::{CaptureDevice, CaptureError, CaptureStream, MirrorStore, RemoteGateway};
use crate::application::services::sync_queue_service::SyncQueueService;
use crate::domain::entities::{EventRecord, ScanLog, SyncAction, Ticket};
use crate::domain::value_objects::{Collection, Credential};
use crate::shared::error::AppError;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, watch};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    Decoding,
    Validating,
    Classified,
}

/// A classified scan plus whatever the local mirror knows about the ticket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    pub log: ScanLog,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Classified(ScanOutcome),
    /// Stopped before a result could be shown.
    Dismissed,
    /// The capture stream ended without producing a credential.
    Ended,
}

pub struct ScanPipeline {
    gateway: Arc<dyn RemoteGateway>,
    store: Arc<dyn MirrorStore>,
    queue: Arc<SyncQueueService>,
    device: Arc<dyn CaptureDevice>,
    camera: Arc<Mutex<()>>,
    phase: watch::Sender<ScanPhase>,
    scanner_id: String,
    device_info: String,
}

impl ScanPipeline {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        store: Arc<dyn MirrorStore>,
        queue: Arc<SyncQueueService>,
        device: Arc<dyn CaptureDevice>,
        scanner_id: String,
        device_info: String,
    ) -> Self {
        let (phase, _) = watch::channel(ScanPhase::Idle);
        Self {
            gateway,
            store,
            queue,
            device,
            camera: Arc::new(Mutex::new(())),
            phase,
            scanner_id,
            device_info,
        }
    }

    pub fn phase(&self) -> ScanPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<ScanPhase> {
        self.phase.subscribe()
    }

    /// Returns to `Idle` once the caller has shown the classification.
    pub fn acknowledge(&self) {
        self.phase.send_if_modified(|phase| {
            if *phase == ScanPhase::Classified {
                *phase = ScanPhase::Idle;
                return true;
            }
            false
        });
    }

    /// Classifies a credential, whether decoded from the camera or typed in.
    ///
    /// Only the gateway decides the classification. When it cannot be reached
    /// the attempt is recorded as `error` and queued for upload; `Unauthorized`
    /// is returned to the caller so the session layer can react. Failing to
    /// store or queue the scan log is an error too; the phase goes back to
    /// `Idle` whenever no classification is returned.
    pub async fn process_credential(&self, text: &str) -> Result<ScanOutcome, AppError> {
        let credential = Credential::new(text).map_err(AppError::InvalidInput)?;
        self.set_phase(ScanPhase::Validating);

        match self.classify(&credential).await {
            Ok(outcome) => {
                self.set_phase(ScanPhase::Classified);
                Ok(outcome)
            }
            Err(err) => {
                self.set_phase(ScanPhase::Idle);
                Err(err)
            }
        }
    }

    async fn classify(&self, credential: &Credential) -> Result<ScanOutcome, AppError> {
        let log = match self
            .gateway
            .scan_ticket(credential.as_str(), &self.scanner_id)
            .await
        {
            Ok(mut log) => {
                if log.device_info.is_empty() {
                    log.device_info = self.device_info.clone();
                }
                self.store_log(&log).await?;
                log
            }
            Err(err) if err.is_auth() => return Err(err),
            Err(err) => {
                tracing::warn!(
                    target: "scan::pipeline",
                    scanner_id = %self.scanner_id,
                    error = %err,
                    "scan validation unavailable, recording error result"
                );
                let log =
                    ScanLog::transport_error(&self.scanner_id, &self.device_info, err.to_string());
                self.store_log(&log).await?;
                self.queue_log(&log).await?;
                log
            }
        };

        tracing::info!(
            target: "scan::pipeline",
            scan_id = %log.id,
            result = %log.result,
            ticket_id = log.ticket_id.as_deref().unwrap_or("-"),
            "scan classified"
        );

        let (ticket, event) = self.enrich(&log).await;
        Ok(ScanOutcome { log, ticket, event })
    }

    /// Takes exclusive ownership of the capture device.
    pub async fn start_session(self: &Arc<Self>) -> Result<ScanSession, AppError> {
        let permit = Arc::clone(&self.camera)
            .try_lock_owned()
            .map_err(|_| CaptureError::Busy)?;
        let stream = self.device.open().await?;

        self.set_phase(ScanPhase::Decoding);
        tracing::debug!(target: "scan::pipeline", "capture session started");

        Ok(ScanSession {
            pipeline: Arc::clone(self),
            stream: Some(stream),
            permit: Some(permit),
        })
    }

    pub fn is_capturing(&self) -> bool {
        self.camera.try_lock().is_err()
    }

    async fn enrich(&self, log: &ScanLog) -> (Option<Ticket>, Option<EventRecord>) {
        let Some(ticket_id) = log.ticket_id.as_deref() else {
            return (None, None);
        };

        let ticket: Option<Ticket> =
            match load_record(self.store.as_ref(), Collection::Tickets, ticket_id).await {
                Ok(ticket) => ticket,
                Err(err) => {
                    tracing::warn!(
                        target: "scan::pipeline",
                        ticket_id,
                        error = %err,
                        "ticket lookup failed, skipping enrichment"
                    );
                    None
                }
            };

        let event = match &ticket {
            Some(ticket) => {
                match load_record(self.store.as_ref(), Collection::Events, &ticket.event_id).await {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(
                            target: "scan::pipeline",
                            event_id = %ticket.event_id,
                            error = %err,
                            "event lookup failed, skipping enrichment"
                        );
                        None
                    }
                }
            }
            None => None,
        };

        (ticket, event)
    }

    async fn store_log(&self, log: &ScanLog) -> Result<(), AppError> {
        if let Err(err) = save_record(self.store.as_ref(), Collection::ScanLogs, &log.id, log).await
        {
            tracing::error!(
                target: "scan::pipeline",
                scan_id = %log.id,
                error = %err,
                "failed to store scan log locally"
            );
            return Err(err);
        }
        Ok(())
    }

    async fn queue_log(&self, log: &ScanLog) -> Result<(), AppError> {
        let action = SyncAction::RecordScan {
            scan_log: log.clone(),
        };
        match self.queue.enqueue(action).await {
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::error!(
                    target: "scan::pipeline",
                    scan_id = %log.id,
                    error = %err,
                    "failed to queue scan log upload"
                );
                Err(err)
            }
        }
    }

    fn set_phase(&self, next: ScanPhase) {
        self.phase.send_replace(next);
    }
}

enum DecodeEvent {
    Cancelled,
    Frame(Result<Option<String>, CaptureError>),
}

/// An active camera session. The device is released on every exit path:
/// `stop`, the first decoded credential, a capture error, or drop.
pub struct ScanSession {
    pipeline: Arc<ScanPipeline>,
    stream: Option<Box<dyn CaptureStream>>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl ScanSession {
    /// Decodes until the first credential, then classifies it.
    ///
    /// Cancelling stops decoding immediately. A validation call that is already
    /// in flight still completes, but its outcome is reported as `Dismissed`.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<SessionOutcome, AppError> {
        let credential = loop {
            let event = {
                let Some(stream) = self.stream.as_mut() else {
                    return Ok(SessionOutcome::Ended);
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => DecodeEvent::Cancelled,
                    frame = stream.next_decoded() => DecodeEvent::Frame(frame),
                }
            };

            match event {
                DecodeEvent::Cancelled => {
                    self.release_to_idle();
                    return Ok(SessionOutcome::Dismissed);
                }
                DecodeEvent::Frame(Ok(Some(text))) if !text.trim().is_empty() => break text,
                DecodeEvent::Frame(Ok(Some(_))) => continue,
                DecodeEvent::Frame(Err(CaptureError::Decode(reason))) => {
                    tracing::debug!(target: "scan::pipeline", reason = %reason, "unreadable frame");
                    continue;
                }
                DecodeEvent::Frame(Ok(None)) => {
                    self.release_to_idle();
                    return Ok(SessionOutcome::Ended);
                }
                DecodeEvent::Frame(Err(err)) => {
                    self.release_to_idle();
                    return Err(err.into());
                }
            }
        };

        // 1回デコードしたらカメラを解放してから検証する
        self.release();
        let outcome = self.pipeline.process_credential(&credential).await?;

        if cancel.is_cancelled() {
            tracing::debug!(
                target: "scan::pipeline",
                scan_id = %outcome.log.id,
                "session dismissed during validation"
            );
            self.pipeline.acknowledge();
            return Ok(SessionOutcome::Dismissed);
        }
        Ok(SessionOutcome::Classified(outcome))
    }

    pub fn stop(mut self) {
        self.release_to_idle();
    }

    fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
            tracing::debug!(target: "scan::pipeline", "capture device released");
        }
        self.permit.take();
    }

    fn release_to_idle(&mut self) {
        self.release();
        self.pipeline.phase.send_if_modified(|phase| {
            if *phase == ScanPhase::Decoding {
                *phase = ScanPhase::Idle;
                return true;
            }
            false
        });
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if self.stream.is_some() || self.permit.is_some() {
            self.release_to_idle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::ManualFlush;
    use crate::domain::value_objects::{RetryPolicy, ScanResult};
    use crate::infrastructure::capture::ChannelCaptureDevice;
    use crate::infrastructure::database::ConnectionPool;
    use crate::infrastructure::storage::SqliteMirrorStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use mockall::mock;
    use mockall::predicate::eq;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    mock! {
        pub Gateway {}

        #[async_trait]
        impl RemoteGateway for Gateway {
            async fn scan_ticket(&self, qr_payload: &str, scanner_id: &str) -> Result<ScanLog, AppError>;
            async fn apply(&self, action: &SyncAction) -> Result<(), AppError>;
        }
    }

    struct Fixture {
        pipeline: Arc<ScanPipeline>,
        store: Arc<dyn MirrorStore>,
        queue: Arc<SyncQueueService>,
        device: ChannelCaptureDevice,
        frames: mpsc::Sender<crate::infrastructure::capture::Frame>,
    }

    /// Reads pass through; every write fails as if the disk were full.
    struct FullDiskStore {
        inner: Arc<dyn MirrorStore>,
    }

    #[async_trait]
    impl MirrorStore for FullDiskStore {
        async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, AppError> {
            self.inner.get(collection, key).await
        }

        async fn set(&self, _: Collection, _: &str, _: Value) -> Result<Value, AppError> {
            Err(AppError::Storage("database or disk is full".into()))
        }

        async fn get_all(&self, collection: Collection) -> Result<Vec<Value>, AppError> {
            self.inner.get_all(collection).await
        }

        async fn remove(&self, collection: Collection, key: &str) -> Result<(), AppError> {
            self.inner.remove(collection, key).await
        }

        async fn clear(&self, collection: Collection) -> Result<(), AppError> {
            self.inner.clear(collection).await
        }

        async fn list_keys(&self, collection: Collection) -> Result<Vec<String>, AppError> {
            self.inner.list_keys(collection).await
        }
    }

    async fn sqlite_store() -> Arc<dyn MirrorStore> {
        let pool = ConnectionPool::from_memory().await.expect("in-memory sqlite");
        pool.migrate().await.expect("migrations");
        Arc::new(SqliteMirrorStore::new(pool))
    }

    async fn fixture(gateway: MockGateway) -> Fixture {
        fixture_with_store(gateway, sqlite_store().await)
    }

    fn fixture_with_store(gateway: MockGateway, store: Arc<dyn MirrorStore>) -> Fixture {
        let gateway: Arc<dyn RemoteGateway> = Arc::new(gateway);
        let queue = Arc::new(SyncQueueService::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::new(ManualFlush),
            RetryPolicy::default(),
        ));
        let (device, frames) = ChannelCaptureDevice::new(4);
        let pipeline = Arc::new(ScanPipeline::new(
            gateway,
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::new(device.clone()),
            "gate-a".into(),
            "handheld".into(),
        ));
        Fixture {
            pipeline,
            store,
            queue,
            device,
            frames,
        }
    }

    fn log_for(result: ScanResult, ticket_id: Option<&str>) -> ScanLog {
        ScanLog {
            id: format!("scan-{result}"),
            ticket_id: ticket_id.map(str::to_string),
            scanner_id: "gate-a".into(),
            timestamp: Utc::now(),
            result,
            device_info: String::new(),
            error_message: None,
            synced: true,
        }
    }

    async fn seed_ticket(store: &dyn MirrorStore) {
        store
            .set(
                Collection::Tickets,
                "t-1",
                json!({
                    "id": "t-1",
                    "eventId": "evt-1",
                    "ticketTypeId": "tt-1",
                    "buyerName": "Aiko",
                    "buyerEmail": "aiko@example.com",
                    "qrPayload": "TKT-001",
                    "issuedAt": "2026-05-01T10:00:00Z"
                }),
            )
            .await
            .unwrap();
        store
            .set(
                Collection::Events,
                "evt-1",
                json!({ "id": "evt-1", "name": "Spring Fest", "venue": "Hall B" }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn valid_scan_is_stored_and_enriched() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_scan_ticket()
            .with(eq("TKT-001"), eq("gate-a"))
            .times(1)
            .returning(|_, _| Ok(log_for(ScanResult::Valid, Some("t-1"))));
        let fx = fixture(gateway).await;
        seed_ticket(fx.store.as_ref()).await;

        let outcome = fx.pipeline.process_credential("  TKT-001 ").await.unwrap();

        assert_eq!(outcome.log.result, ScanResult::Valid);
        assert_eq!(outcome.log.device_info, "handheld");
        assert_eq!(outcome.ticket.as_ref().map(|t| t.id.as_str()), Some("t-1"));
        assert_eq!(outcome.event.as_ref().map(|e| e.name.as_str()), Some("Spring Fest"));
        assert_eq!(fx.pipeline.phase(), ScanPhase::Classified);

        let stored = fx
            .store
            .get(Collection::ScanLogs, &outcome.log.id)
            .await
            .unwrap();
        assert!(stored.is_some());
        assert_eq!(fx.queue.pending_count().await.unwrap(), 0);

        fx.pipeline.acknowledge();
        assert_eq!(fx.pipeline.phase(), ScanPhase::Idle);
    }

    #[tokio::test]
    async fn unknown_ticket_is_invalid_without_enrichment() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_scan_ticket()
            .times(1)
            .returning(|_, _| Ok(log_for(ScanResult::Invalid, None)));
        let fx = fixture(gateway).await;

        let outcome = fx.pipeline.process_credential("NOPE").await.unwrap();
        assert_eq!(outcome.log.result, ScanResult::Invalid);
        assert!(outcome.ticket.is_none());
        assert!(outcome.event.is_none());
    }

    #[tokio::test]
    async fn blank_credential_never_reaches_the_gateway() {
        let mut gateway = MockGateway::new();
        gateway.expect_scan_ticket().never();
        let fx = fixture(gateway).await;

        let err = fx.pipeline.process_credential("   ").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(fx.pipeline.phase(), ScanPhase::Idle);
    }

    #[tokio::test]
    async fn transport_failure_is_classified_as_error_and_queued() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_scan_ticket()
            .times(1)
            .returning(|_, _| Err(AppError::Network("connection reset".into())));
        let fx = fixture(gateway).await;

        let outcome = fx.pipeline.process_credential("TKT-001").await.unwrap();
        assert_eq!(outcome.log.result, ScanResult::Error);
        assert!(!outcome.log.synced);
        assert!(outcome.log.error_message.as_deref().unwrap().contains("connection reset"));

        let queue = fx.queue.get_sync_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].action, "record_scan");
    }

    #[tokio::test]
    async fn storage_failure_during_offline_scan_reaches_the_caller() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_scan_ticket()
            .times(1)
            .returning(|_, _| Err(AppError::Network("connection refused".into())));
        gateway.expect_apply().never();
        let backing = sqlite_store().await;
        let fx = fixture_with_store(
            gateway,
            Arc::new(FullDiskStore {
                inner: Arc::clone(&backing),
            }),
        );

        let err = fx.pipeline.process_credential("TKT-1").await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert_eq!(fx.pipeline.phase(), ScanPhase::Idle);
        assert!(backing.get_all(Collection::ScanLogs).await.unwrap().is_empty());
        assert!(fx.queue.get_sync_queue().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_after_validation_reaches_the_caller() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_scan_ticket()
            .times(1)
            .returning(|_, _| Ok(log_for(ScanResult::Valid, Some("t-1"))));
        let fx = fixture_with_store(
            gateway,
            Arc::new(FullDiskStore {
                inner: sqlite_store().await,
            }),
        );

        let err = fx.pipeline.process_credential("TKT-001").await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert_eq!(fx.pipeline.phase(), ScanPhase::Idle);
    }

    #[tokio::test]
    async fn unauthorized_is_returned_to_the_caller() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_scan_ticket()
            .times(1)
            .returning(|_, _| Err(AppError::Unauthorized("session expired".into())));
        let fx = fixture(gateway).await;

        let err = fx.pipeline.process_credential("TKT-001").await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(fx.queue.pending_count().await.unwrap(), 0);
        assert_eq!(fx.pipeline.phase(), ScanPhase::Idle);
    }

    #[tokio::test]
    async fn session_releases_camera_after_first_decode() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_scan_ticket()
            .with(eq("TKT-001"), eq("gate-a"))
            .times(1)
            .returning(|_, _| Ok(log_for(ScanResult::Valid, None)));
        let fx = fixture(gateway).await;

        let session = fx.pipeline.start_session().await.unwrap();
        assert!(fx.pipeline.is_capturing());
        assert_eq!(fx.pipeline.phase(), ScanPhase::Decoding);
        assert!(fx.pipeline.start_session().await.is_err());

        fx.frames
            .send(Err(CaptureError::Decode("blurry".into())))
            .await
            .unwrap();
        fx.frames.send(Ok("TKT-001".into())).await.unwrap();

        let outcome = session.run(CancellationToken::new()).await.unwrap();
        assert!(matches!(
            outcome,
            SessionOutcome::Classified(ScanOutcome { ref log, .. }) if log.result == ScanResult::Valid
        ));
        assert!(!fx.pipeline.is_capturing());
        assert!(!fx.device.is_open());

        let again = fx.pipeline.start_session().await.unwrap();
        again.stop();
        assert!(!fx.pipeline.is_capturing());
    }

    #[tokio::test]
    async fn cancelled_session_is_dismissed_and_released() {
        let mut gateway = MockGateway::new();
        gateway.expect_scan_ticket().never();
        let fx = fixture(gateway).await;

        let session = fx.pipeline.start_session().await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = session.run(cancel).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Dismissed);
        assert!(!fx.pipeline.is_capturing());
        assert_eq!(fx.pipeline.phase(), ScanPhase::Idle);
    }

    #[tokio::test]
    async fn dropped_session_releases_the_camera() {
        let gateway = MockGateway::new();
        let fx = fixture(gateway).await;

        {
            let _session = fx.pipeline.start_session().await.unwrap();
            assert!(fx.device.is_open());
        }
        assert!(!fx.device.is_open());
        assert!(!fx.pipeline.is_capturing());
        assert_eq!(fx.pipeline.phase(), ScanPhase::Idle);
    }

    #[tokio::test]
    async fn capture_failure_releases_the_camera() {
        let gateway = MockGateway::new();
        let fx = fixture(gateway).await;

        let session = fx.pipeline.start_session().await.unwrap();
        fx.frames
            .send(Err(CaptureError::Unavailable("sensor unplugged".into())))
            .await
            .unwrap();

        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(!fx.pipeline.is_capturing());
        assert!(fx.pipeline.start_session().await.is_ok());
    }
}
