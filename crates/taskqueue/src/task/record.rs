//! Task record and lifecycle state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task status
///
/// ```text
/// Pending ──▶ Processing ──┬──▶ Completed
///                 ▲        ├──▶ Failed
///                 │        └──▶ Retrying ──(re-queued)──┐
///                 └─────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted and waiting in its queue
    Pending,

    /// Held by a worker, handler running
    Processing,

    /// Handler succeeded
    Completed,

    /// Retries exhausted or permanent failure
    Failed,

    /// Failed attempt, waiting out the backoff or back in the queue
    Retrying,
}

impl TaskStatus {
    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Retrying => write!(f, "retrying"),
        }
    }
}

/// Outcome of recording a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Task goes back to its queue after the backoff for this retry number
    WillRetry { retry_count: u32 },

    /// Task is terminally failed
    Failed,
}

/// One submitted unit of work
///
/// Records are owned by the manager's task table. Only the worker currently
/// holding a task mutates its record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub task_type: String,
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// Start of the most recent attempt
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Number of handler invocations so far
    pub attempts: u32,
    pub error_message: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl TaskRecord {
    /// Create a pending record
    pub fn new(
        id: impl Into<String>,
        task_type: impl Into<String>,
        payload: serde_json::Value,
        max_retries: u32,
    ) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            payload,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries,
            attempts: 0,
            error_message: None,
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition to `Processing` at the start of an attempt
    pub fn mark_processing(&mut self) {
        self.status = TaskStatus::Processing;
        self.started_at = Some(Utc::now());
        self.attempts += 1;
    }

    /// Transition to `Completed` with the handler's result
    pub fn mark_completed(&mut self, result: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
        self.error_message = None;
    }

    /// Record a failed attempt
    ///
    /// A retryable failure schedules another attempt while `retry_count` is
    /// below `max_retries`; the count never goes past the ceiling. A permanent
    /// failure skips the remaining budget.
    pub fn record_failure(&mut self, message: impl Into<String>, retryable: bool) -> FailureOutcome {
        self.error_message = Some(message.into());

        if retryable && self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.status = TaskStatus::Retrying;
            return FailureOutcome::WillRetry {
                retry_count: self.retry_count,
            };
        }

        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.result = None;
        FailureOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_record_is_pending() {
        let record = TaskRecord::new("t1", "sum", json!({"a": 1}), 3);

        assert_eq!(record.status, TaskStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.attempts, 0);
        assert!(record.started_at.is_none());
        assert!(record.completed_at.is_none());
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_completion() {
        let mut record = TaskRecord::new("t1", "sum", json!({}), 3);
        record.mark_processing();
        assert_eq!(record.status, TaskStatus::Processing);
        assert_eq!(record.attempts, 1);

        record.mark_completed(json!(5));
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.result, Some(json!(5)));
        assert!(record.error_message.is_none());
        assert!(record.completed_at.is_some());
        assert!(record.completed_at >= record.started_at);
    }

    #[test]
    fn test_retry_until_exhausted() {
        let mut record = TaskRecord::new("t1", "flaky", json!({}), 2);

        record.mark_processing();
        assert_eq!(
            record.record_failure("boom", true),
            FailureOutcome::WillRetry { retry_count: 1 }
        );
        assert_eq!(record.status, TaskStatus::Retrying);
        assert!(record.completed_at.is_none());

        record.mark_processing();
        assert_eq!(
            record.record_failure("boom", true),
            FailureOutcome::WillRetry { retry_count: 2 }
        );

        record.mark_processing();
        assert_eq!(record.record_failure("boom again", true), FailureOutcome::Failed);
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.retry_count, 2);
        assert_eq!(record.attempts, 3);
        assert_eq!(record.error_message.as_deref(), Some("boom again"));
        assert!(record.completed_at.is_some());
        assert!(record.result.is_none());
    }

    #[test]
    fn test_zero_retries_fails_on_first_error() {
        let mut record = TaskRecord::new("t1", "flaky", json!({}), 0);
        record.mark_processing();

        assert_eq!(record.record_failure("nope", true), FailureOutcome::Failed);
        assert_eq!(record.retry_count, 0);
    }

    #[test]
    fn test_permanent_failure_skips_budget() {
        let mut record = TaskRecord::new("t1", "validate", json!({}), 5);
        record.mark_processing();

        assert_eq!(record.record_failure("bad input", false), FailureOutcome::Failed);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.status, TaskStatus::Failed);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&TaskStatus::Retrying).unwrap(), "\"retrying\"");
        assert_eq!(TaskStatus::Processing.to_string(), "processing");
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
    }
}
