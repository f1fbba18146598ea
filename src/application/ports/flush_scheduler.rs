use std::time::Duration;

/// Requests a sync queue flush after `delay`. Implementations must not block.
pub trait FlushScheduler: Send + Sync {
    fn schedule_flush(&self, delay: Duration);
}

/// Scheduler that drops every request; flushes only happen when called directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualFlush;

impl FlushScheduler for ManualFlush {
    fn schedule_flush(&self, _delay: Duration) {}
}
