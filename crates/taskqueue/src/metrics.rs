//! Aggregate task metrics
//!
//! Counters plus an incrementally maintained mean processing time. No
//! per-task duration history is kept.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Running counters, updated alongside terminal status changes
#[derive(Debug, Clone, Default)]
pub struct TaskMetrics {
    tasks_processed: u64,
    tasks_failed: u64,
    retries_scheduled: u64,
    avg_processing_secs: f64,
}

impl TaskMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a successful task and fold its processing time into the mean
    pub fn record_success(&mut self, processing_time: Duration) {
        self.tasks_processed += 1;
        let n = self.tasks_processed as f64;
        let sample = processing_time.as_secs_f64();
        self.avg_processing_secs = (self.avg_processing_secs * (n - 1.0) + sample) / n;
    }

    /// Count a terminally failed task
    pub fn record_failure(&mut self) {
        self.tasks_failed += 1;
    }

    /// Count a failed attempt that was sent back for another try
    pub fn record_retry(&mut self) {
        self.retries_scheduled += 1;
    }

    pub fn tasks_processed(&self) -> u64 {
        self.tasks_processed
    }

    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed
    }

    pub fn avg_processing_time(&self) -> Duration {
        Duration::from_secs_f64(self.avg_processing_secs)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_processed: self.tasks_processed,
            tasks_failed: self.tasks_failed,
            retries_scheduled: self.retries_scheduled,
            avg_processing_secs: self.avg_processing_secs,
        }
    }
}

/// Point-in-time copy of [`TaskMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Tasks that completed successfully
    pub tasks_processed: u64,
    /// Tasks that ended in `Failed`
    pub tasks_failed: u64,
    /// Failed attempts that were re-queued
    pub retries_scheduled: u64,
    /// Mean processing time of successful tasks, in seconds
    pub avg_processing_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics() {
        let metrics = TaskMetrics::new();
        assert_eq!(metrics.tasks_processed(), 0);
        assert_eq!(metrics.tasks_failed(), 0);
        assert_eq!(metrics.avg_processing_time(), Duration::ZERO);
    }

    #[test]
    fn test_running_average() {
        let mut metrics = TaskMetrics::new();
        metrics.record_success(Duration::from_millis(100));
        metrics.record_success(Duration::from_millis(300));
        metrics.record_success(Duration::from_millis(200));

        let avg = metrics.avg_processing_time().as_secs_f64();
        assert!((avg - 0.2).abs() < 1e-9, "avg was {avg}");
        assert_eq!(metrics.tasks_processed(), 3);
    }

    #[test]
    fn test_failures_do_not_move_average() {
        let mut metrics = TaskMetrics::new();
        metrics.record_success(Duration::from_millis(50));
        metrics.record_failure();
        metrics.record_retry();
        metrics.record_retry();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_processed, 1);
        assert_eq!(snapshot.tasks_failed, 1);
        assert_eq!(snapshot.retries_scheduled, 2);
        assert!((snapshot.avg_processing_secs - 0.05).abs() < 1e-9);
    }
}
