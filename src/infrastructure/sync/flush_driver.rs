use crate::application::ports::FlushScheduler;
use crate::application::services::SyncQueueService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Forwards flush requests to the driver task over an unbounded channel.
#[derive(Clone)]
pub struct ChannelFlushScheduler {
    tx: mpsc::UnboundedSender<Duration>,
}

impl ChannelFlushScheduler {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Duration>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl FlushScheduler for ChannelFlushScheduler {
    fn schedule_flush(&self, delay: Duration) {
        if self.tx.send(delay).is_err() {
            tracing::debug!(
                target: "sync::driver",
                delay_ms = delay.as_millis() as u64,
                "flush driver stopped, dropping request"
            );
        }
    }
}

/// Runs scheduled and periodic flushes until `cancel` fires.
///
/// Items left pending by a previous run are flushed right away. Each request
/// becomes a timer task that sleeps for the requested delay and then flushes;
/// pending timers are abandoned on cancellation.
pub fn spawn_flush_driver(
    queue: Arc<SyncQueueService>,
    mut requests: mpsc::UnboundedReceiver<Duration>,
    periodic: Option<Duration>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = periodic.filter(|p| !p.is_zero()).map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        spawn_delayed_flush(queue.clone(), Duration::ZERO, cancel.child_token());

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                request = requests.recv() => match request {
                    Some(delay) => spawn_delayed_flush(queue.clone(), delay, cancel.child_token()),
                    None => break,
                },
                _ = next_tick(&mut ticker) => run_flush(&queue, "periodic").await,
            }
        }

        tracing::debug!(target: "sync::driver", "flush driver stopped");
    })
}

fn spawn_delayed_flush(queue: Arc<SyncQueueService>, delay: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        run_flush(&queue, "scheduled").await;
    });
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn run_flush(queue: &SyncQueueService, trigger: &'static str) {
    if let Err(err) = queue.flush().await {
        tracing::error!(
            target: "sync::driver",
            trigger,
            error = %err,
            "sync queue flush failed"
        );
    }
}
