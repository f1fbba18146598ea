use super::http_gateway::HttpRemoteGateway;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> Result<(), AppError>;
}

#[async_trait]
impl HealthCheck for HttpRemoteGateway {
    async fn check(&self) -> Result<(), AppError> {
        self.health().await
    }
}

/// Polls `target` and publishes reachability on `online`. Only transitions
/// wake receivers.
pub fn spawn_health_probe(
    target: Arc<dyn HealthCheck>,
    online: watch::Sender<bool>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let reachable = match target.check().await {
                        Ok(()) => true,
                        Err(err) => {
                            tracing::debug!(target: "gateway::http", error = %err, "health check failed");
                            false
                        }
                    };
                    let changed = online.send_if_modified(|current| {
                        if *current == reachable {
                            return false;
                        }
                        *current = reachable;
                        true
                    });
                    if changed {
                        tracing::info!(target: "gateway::http", online = reachable, "gateway reachability changed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Toggle(AtomicBool);

    #[async_trait]
    impl HealthCheck for Toggle {
        async fn check(&self) -> Result<(), AppError> {
            if self.0.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(AppError::Network("connection refused".into()))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_transitions_only() {
        let toggle = Arc::new(Toggle(AtomicBool::new(false)));
        let (tx, mut rx) = watch::channel(true);
        let cancel = CancellationToken::new();
        let handle = spawn_health_probe(
            toggle.clone(),
            tx,
            Duration::from_millis(100),
            cancel.clone(),
        );

        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());

        toggle.0.store(true, Ordering::SeqCst);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());

        cancel.cancel();
        handle.await.unwrap();
    }
}
