//! Error types surfaced to queue callers

/// Errors returned by [`TaskManager`](crate::TaskManager) operations
///
/// Handler failures never show up here; they are recorded on the task record
/// and drive the retry state machine instead.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// No handler registered for the submitted task type
    #[error("no handler registered for task type: {0}")]
    HandlerNotFound(String),

    /// A caller-supplied task id is already in use
    #[error("task id already exists: {0}")]
    DuplicateTaskId(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = QueueError::HandlerNotFound("report".to_string());
        assert_eq!(err.to_string(), "no handler registered for task type: report");

        let err = QueueError::DuplicateTaskId("job-1".to_string());
        assert_eq!(err.to_string(), "task id already exists: job-1");
    }
}
