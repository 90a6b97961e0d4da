//! Execution statistics
//!
//! Guarded by its own lock, separate from the queues, and only updated after
//! a closure has returned.

use cadence_common::events::StatsSnapshot;
use cadence_common::time::as_millis_f64;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub(crate) struct StatsCollector {
    processed: u64,
    failed: u64,
    dropped: u64,
    min_latency: Option<Duration>,
    max_latency: Duration,
    total_latency: Duration,
    since: DateTime<Utc>,
}

impl StatsCollector {
    pub(crate) fn new() -> Self {
        Self {
            processed: 0,
            failed: 0,
            dropped: 0,
            min_latency: None,
            max_latency: Duration::ZERO,
            total_latency: Duration::ZERO,
            since: Utc::now(),
        }
    }

    pub(crate) fn record_success(&mut self, elapsed: Duration) {
        self.processed += 1;
        self.total_latency += elapsed;
        self.max_latency = self.max_latency.max(elapsed);
        self.min_latency = Some(match self.min_latency {
            Some(min) => min.min(elapsed),
            None => elapsed,
        });
    }

    pub(crate) fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub(crate) fn record_dropped(&mut self, count: u64) {
        self.dropped += count;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    /// Snapshot with the caller-supplied queue depths
    pub(crate) fn snapshot(&self, pending: (usize, usize, usize)) -> StatsSnapshot {
        let avg = if self.processed > 0 {
            as_millis_f64(self.total_latency) / self.processed as f64
        } else {
            0.0
        };

        StatsSnapshot {
            processed: self.processed,
            failed: self.failed,
            dropped: self.dropped,
            pending_immediate: pending.0,
            pending_delayed: pending.1,
            pending_batch: pending.2,
            min_latency_ms: self.min_latency.map(as_millis_f64).unwrap_or(0.0),
            max_latency_ms: as_millis_f64(self.max_latency),
            avg_latency_ms: avg,
            since: Some(self.since),
        }
    }
}
