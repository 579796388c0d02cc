//! Bounded pool for blocking handlers
//!
//! Blocking handlers run on tokio's blocking threads. A semaphore caps how
//! many run at once, either across all task types or per type.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{error, trace};

use crate::config::BlockingPoolScope;
use crate::task::{BlockingFn, HandlerError, HandlerResult};

/// Runs synchronous handlers off the async workers
#[derive(Debug)]
pub struct BlockingExecutor {
    scope: BlockingPoolScope,
    size: usize,
    shared: Arc<Semaphore>,
    per_type: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl BlockingExecutor {
    pub fn new(scope: BlockingPoolScope, size: usize) -> Self {
        let size = size.max(1);
        Self {
            scope,
            size,
            shared: Arc::new(Semaphore::new(size)),
            per_type: Mutex::new(HashMap::new()),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn scope(&self) -> BlockingPoolScope {
        self.scope
    }

    /// Free slots in the pool serving `task_type`
    pub fn available(&self, task_type: &str) -> usize {
        self.semaphore_for(task_type).available_permits()
    }

    fn semaphore_for(&self, task_type: &str) -> Arc<Semaphore> {
        match self.scope {
            BlockingPoolScope::Shared => Arc::clone(&self.shared),
            BlockingPoolScope::PerType => Arc::clone(
                self.per_type
                    .lock()
                    .entry(task_type.to_string())
                    .or_insert_with(|| Arc::new(Semaphore::new(self.size))),
            ),
        }
    }

    /// Run `handler` on a blocking thread once a pool slot is free
    ///
    /// The slot is held by the blocking closure itself, so a caller that stops
    /// waiting (timeout) does not free it before the handler actually returns.
    pub async fn run(
        &self,
        task_type: &str,
        handler: BlockingFn,
        payload: serde_json::Value,
    ) -> HandlerResult {
        let permit = self
            .semaphore_for(task_type)
            .acquire_owned()
            .await
            .map_err(|_| HandlerError::retryable("blocking pool closed"))?;

        trace!(%task_type, "Offloading blocking handler");

        let join = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            handler(payload)
        });

        match join.await {
            Ok(result) => result,
            Err(e) => {
                error!(%task_type, "Blocking handler did not complete: {}", e);
                Err(HandlerError::retryable(format!(
                    "blocking handler did not complete: {e}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_runs_handler() {
        let executor = BlockingExecutor::new(BlockingPoolScope::Shared, 2);
        let handler: BlockingFn = Arc::new(|payload: serde_json::Value| -> HandlerResult {
            Ok(json!(payload["n"].as_i64().unwrap_or(0) + 1))
        });

        let result = executor.run("inc", handler, json!({"n": 41})).await;
        assert_eq!(result, Ok(json!(42)));
        assert_eq!(executor.available("inc"), 2);
    }

    #[tokio::test]
    async fn test_panic_becomes_retryable_error() {
        let executor = BlockingExecutor::new(BlockingPoolScope::Shared, 1);
        let handler: BlockingFn = Arc::new(|_: serde_json::Value| -> HandlerResult { panic!("kaboom") });

        let result = executor.run("bad", handler, json!({})).await;
        assert!(matches!(result, Err(HandlerError::Retryable(_))));
        assert_eq!(executor.available("bad"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let executor = Arc::new(BlockingExecutor::new(BlockingPoolScope::Shared, 2));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handler: BlockingFn = {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            Arc::new(move |_: serde_json::Value| -> HandlerResult {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(30));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(json!(null))
            })
        };

        let runs: Vec<_> = (0..6)
            .map(|i| {
                let executor = Arc::clone(&executor);
                let handler = Arc::clone(&handler);
                let task_type = if i % 2 == 0 { "a" } else { "b" };
                tokio::spawn(async move { executor.run(task_type, handler, json!({})).await })
            })
            .collect();

        for run in futures::future::join_all(runs).await {
            assert!(run.unwrap().is_ok());
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_per_type_pools_are_independent() {
        let executor = BlockingExecutor::new(BlockingPoolScope::PerType, 3);

        assert_eq!(executor.available("a"), 3);
        assert_eq!(executor.available("b"), 3);
        assert!(!Arc::ptr_eq(
            &executor.semaphore_for("a"),
            &executor.semaphore_for("b")
        ));
        assert!(Arc::ptr_eq(
            &executor.semaphore_for("a"),
            &executor.semaphore_for("a")
        ));
    }
}
