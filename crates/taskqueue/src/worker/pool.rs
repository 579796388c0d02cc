//! Worker pool for one task type
//!
//! Each worker loops: check shutdown, wait on the queue with a bounded
//! timeout, process whatever it dequeued.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::execute::process_task;
use crate::engine::state::SharedState;
use crate::queue::TaskQueue;

/// Set of workers serving one task type's queue
#[derive(Debug)]
pub struct WorkerPool {
    task_type: String,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers on the current runtime
    pub(crate) fn spawn(
        runtime: &tokio::runtime::Handle,
        state: Arc<SharedState>,
        queue: Arc<TaskQueue>,
        size: usize,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let task_type = queue.task_type().to_string();
        info!(%task_type, workers = size, "Starting worker pool");

        let handles = (0..size)
            .map(|worker_index| {
                runtime.spawn(worker_loop(
                    Arc::clone(&state),
                    Arc::clone(&queue),
                    worker_index,
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        Self { task_type, handles }
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// Number of workers in the pool
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit
    ///
    /// Shutdown must already have been signalled.
    pub async fn join(self) {
        let results = futures::future::join_all(self.handles).await;
        for result in results {
            if let Err(e) = result {
                error!(task_type = %self.task_type, "Worker exited abnormally: {}", e);
            }
        }
        debug!(task_type = %self.task_type, "Worker pool stopped");
    }
}

async fn worker_loop(
    state: Arc<SharedState>,
    queue: Arc<TaskQueue>,
    worker_index: usize,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let task_type = queue.task_type().to_string();
    let poll_interval = state.config.poll_interval;
    debug!(%task_type, worker_index, "Worker started");

    loop {
        if *shutdown_rx.borrow() {
            debug!(%task_type, worker_index, "Worker: shutdown requested");
            break;
        }

        let task_id = tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    debug!(%task_type, worker_index, "Worker: manager dropped");
                    break;
                }
                continue;
            }
            task_id = queue.pop_timeout(poll_interval) => task_id,
        };

        if let Some(task_id) = task_id {
            process_task(&state, &queue, task_id, &mut shutdown_rx).await;
        }
    }

    debug!(%task_type, worker_index, "Worker exited");
}
