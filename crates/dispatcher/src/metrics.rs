//! Per-dispatcher delivery metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Delivery counters for one dispatcher
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Packets accepted by `post`
    posted: AtomicU64,
    /// Successful callback invocations
    delivered: AtomicU64,
    /// Packets consumed while paused
    dropped_paused: AtomicU64,
    /// Packets still queued when the worker exited
    discarded: AtomicU64,
    /// Failed or panicking callback invocations
    callback_failures: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }

    pub fn inc_posted(&self) {
        self.posted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_paused(&self) -> u64 {
        self.dropped_paused.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_paused(&self) {
        self.dropped_paused.fetch_add(1, Ordering::Relaxed);
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    pub fn add_discarded(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn callback_failures(&self) -> u64 {
        self.callback_failures.load(Ordering::Relaxed)
    }

    pub fn inc_callback_failures(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of all counters plus the current queue depth
    pub fn snapshot(&self, queue_len: usize) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len,
            posted: self.posted(),
            delivered: self.delivered(),
            dropped_paused: self.dropped_paused(),
            discarded: self.discarded(),
            callback_failures: self.callback_failures(),
        }
    }
}

/// Snapshot of dispatcher metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub posted: u64,
    pub delivered: u64,
    pub dropped_paused: u64,
    pub discarded: u64,
    pub callback_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = DispatchMetrics::new();
        metrics.inc_posted();
        metrics.inc_posted();
        metrics.inc_delivered();
        metrics.inc_dropped_paused();
        metrics.add_discarded(3);
        metrics.inc_callback_failures();

        let snapshot = metrics.snapshot(4);
        assert_eq!(
            snapshot,
            MetricsSnapshot {
                queue_len: 4,
                posted: 2,
                delivered: 1,
                dropped_paused: 1,
                discarded: 3,
                callback_failures: 1,
            }
        );
    }
}
