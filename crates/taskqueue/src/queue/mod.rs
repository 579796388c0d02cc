//! Per-type FIFO queue
//!
//! A queue holds task ids only; records live in the manager's task table.
//! An id may pass through the same queue several times across retries.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

/// FIFO buffer of task ids awaiting execution for one task type
#[derive(Debug)]
pub struct TaskQueue {
    task_type: String,
    items: Mutex<VecDeque<String>>,
    work_notify: Notify,
}

impl TaskQueue {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            items: Mutex::new(VecDeque::new()),
            work_notify: Notify::new(),
        }
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// Append an id at the tail and wake one waiting worker
    pub fn push(&self, task_id: String) {
        self.items.lock().push_back(task_id);
        self.work_notify.notify_one();
    }

    /// Take the head of the queue without waiting
    pub fn try_pop(&self) -> Option<String> {
        self.items.lock().pop_front()
    }

    /// Take the head of the queue, waiting up to `timeout` for work to arrive
    ///
    /// Returns `None` when the timeout elapses on an empty queue, so the
    /// caller gets a chance to observe shutdown.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<String> {
        if let Some(id) = self.try_pop() {
            return Some(id);
        }

        // A push between the check above and this wait leaves a stored permit,
        // so the wakeup is not lost.
        if tokio::time::timeout(timeout, self.work_notify.notified())
            .await
            .is_err()
        {
            trace!(task_type = %self.task_type, "Queue wait timed out");
        }

        self.try_pop()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Snapshot of queued ids, head first
    pub fn snapshot(&self) -> Vec<String> {
        self.items.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fifo_order() {
        let queue = TaskQueue::new("sum");
        queue.push("a".to_string());
        queue.push("b".to_string());
        queue.push("c".to_string());

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.snapshot(), vec!["a", "b", "c"]);
        assert_eq!(queue.try_pop().as_deref(), Some("a"));
        assert_eq!(queue.try_pop().as_deref(), Some("b"));
        assert_eq!(queue.try_pop().as_deref(), Some("c"));
        assert!(queue.try_pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_requeued_id_goes_to_tail() {
        let queue = TaskQueue::new("sum");
        queue.push("a".to_string());
        queue.push("b".to_string());

        let head = queue.try_pop().unwrap();
        queue.push(head);

        assert_eq!(queue.snapshot(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_pop_timeout_on_empty_queue() {
        let queue = TaskQueue::new("sum");
        let start = tokio::time::Instant::now();

        assert!(queue.pop_timeout(Duration::from_millis(20)).await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_pop_timeout_wakes_on_push() {
        let queue = Arc::new(TaskQueue::new("sum"));

        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop_timeout(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push("late".to_string());

        let popped = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake before its own timeout")
            .unwrap();
        assert_eq!(popped.as_deref(), Some("late"));
    }

    #[test]
    fn test_push_without_waiter_is_not_lost() {
        let queue = TaskQueue::new("sum");
        queue.push("early".to_string());

        let popped = tokio_test::block_on(queue.pop_timeout(Duration::from_millis(10)));
        assert_eq!(popped.as_deref(), Some("early"));
    }
}
