//! Task manager: submission, status, lifecycle and cleanup

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::state::SharedState;
use crate::config::ManagerConfig;
use crate::error::QueueError;
use crate::metrics::MetricsSnapshot;
use crate::task::{FnHandler, Handler, HandlerResult, TaskHandler, TaskRecord, TaskStatus};
use crate::worker::WorkerPool;

/// Optional submission parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Caller-chosen task id (generated when absent)
    pub id: Option<String>,
    /// Retry ceiling (manager default when absent)
    pub max_retries: Option<u32>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Aggregate view returned by [`TaskManager::get_stats`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Records currently in the task table
    pub total_tasks: usize,
    /// Record count per status (every status present, zero included)
    pub status_counts: BTreeMap<TaskStatus, usize>,
    /// Ids waiting in each task type's queue
    pub queue_depths: BTreeMap<String, usize>,
    /// Whether workers are running
    pub is_running: bool,
    pub metrics: MetricsSnapshot,
}

impl QueueStats {
    /// Records in `status`
    pub fn count(&self, status: TaskStatus) -> usize {
        self.status_counts.get(&status).copied().unwrap_or(0)
    }

    /// Records not yet in a terminal status
    pub fn outstanding(&self) -> usize {
        self.count(TaskStatus::Pending)
            + self.count(TaskStatus::Processing)
            + self.count(TaskStatus::Retrying)
    }
}

/// Running workers and the channel that stops them
struct Lifecycle {
    runtime: tokio::runtime::Handle,
    shutdown_tx: watch::Sender<bool>,
    pools: HashMap<String, WorkerPool>,
}

/// Background task queue manager
///
/// Owns the handler registry, one FIFO queue per task type, the worker pools
/// and the table of task records. Construct one and share it (usually as
/// `Arc<TaskManager>`) with whatever submits work.
///
/// # Example
///
/// ```ignore
/// use taskqueue::prelude::*;
///
/// let manager = TaskManager::new(ManagerConfig::default());
///
/// manager.register_fn("sum", |payload| async move {
///     let a = payload["a"].as_i64().unwrap_or(0);
///     let b = payload["b"].as_i64().unwrap_or(0);
///     Ok(json!(a + b))
/// });
///
/// manager.start().await;
/// let id = manager.submit("sum", json!({"a": 2, "b": 3}))?;
///
/// // ... later
/// let record = manager.get_status(&id);
/// manager.stop().await;
/// ```
pub struct TaskManager {
    state: Arc<SharedState>,
    lifecycle: Mutex<Option<Lifecycle>>,
    lifecycle_lock: tokio::sync::Mutex<()>,
    id_sequence: AtomicU64,
}

impl TaskManager {
    /// Create a stopped manager
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            state: Arc::new(SharedState::new(config)),
            lifecycle: Mutex::new(None),
            lifecycle_lock: tokio::sync::Mutex::new(()),
            id_sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.state.config
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register an async handler for a task type
    ///
    /// Re-registering a type replaces its handler. If the manager is running
    /// and the type is new, its workers start right away.
    pub fn register<H: TaskHandler>(&self, task_type: &str, handler: H) {
        self.register_handler(task_type, Handler::Async(Arc::new(handler)));
    }

    /// Register an async closure as a handler
    pub fn register_fn<F, Fut>(&self, task_type: &str, handler: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(task_type, FnHandler::new(handler));
    }

    /// Register a synchronous handler, run on the bounded blocking pool
    pub fn register_blocking<F>(&self, task_type: &str, handler: F)
    where
        F: Fn(serde_json::Value) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_handler(task_type, Handler::Blocking(Arc::new(handler)));
    }

    /// Register a handler in an explicit execution mode
    pub fn register_handler(&self, task_type: &str, handler: Handler) {
        let mode = handler.mode();
        if self
            .state
            .registry
            .write()
            .register(task_type, handler)
            .is_some()
        {
            debug!(%task_type, ?mode, "Replaced existing handler");
        } else {
            debug!(%task_type, ?mode, "Registered handler");
        }

        let queue = self.state.queue(task_type);

        let mut lifecycle = self.lifecycle.lock();
        if let Some(lifecycle) = lifecycle.as_mut() {
            if !lifecycle.pools.contains_key(task_type) {
                let pool = WorkerPool::spawn(
                    &lifecycle.runtime,
                    Arc::clone(&self.state),
                    queue,
                    self.state.config.workers_per_type(),
                    lifecycle.shutdown_tx.subscribe(),
                );
                lifecycle.pools.insert(task_type.to_string(), pool);
            }
        }
    }

    /// Registered task type names, sorted
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .state
            .registry
            .read()
            .task_types()
            .map(str::to_string)
            .collect();
        types.sort();
        types
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Submit a payload with default options
    pub fn submit(&self, task_type: &str, payload: serde_json::Value) -> Result<String, QueueError> {
        self.submit_with(task_type, payload, SubmitOptions::default())
    }

    /// Submit a payload, returning its task id without waiting for execution
    ///
    /// # Errors
    ///
    /// - [`QueueError::HandlerNotFound`] if the type has no handler
    /// - [`QueueError::DuplicateTaskId`] if a supplied id is already in use
    ///
    /// No record is created when an error is returned.
    pub fn submit_with(
        &self,
        task_type: &str,
        payload: serde_json::Value,
        options: SubmitOptions,
    ) -> Result<String, QueueError> {
        if !self.state.registry.read().contains(task_type) {
            return Err(QueueError::HandlerNotFound(task_type.to_string()));
        }

        let max_retries = options
            .max_retries
            .unwrap_or(self.state.config.default_max_retries);

        let task_id = {
            let mut table = self.state.table.write();
            let task_id = match options.id {
                Some(id) if table.tasks.contains_key(&id) => {
                    return Err(QueueError::DuplicateTaskId(id));
                }
                Some(id) => id,
                None => loop {
                    let candidate = self.generate_id(task_type);
                    if !table.tasks.contains_key(&candidate) {
                        break candidate;
                    }
                },
            };

            table.tasks.insert(
                task_id.clone(),
                TaskRecord::new(task_id.clone(), task_type, payload, max_retries),
            );
            task_id
        };

        self.state.queue(task_type).push(task_id.clone());
        debug!(%task_id, %task_type, max_retries, "Task submitted");

        Ok(task_id)
    }

    /// `{task_type}_{unix_millis}_{sequence}`; the sequence makes it unique
    fn generate_id(&self, task_type: &str) -> String {
        let sequence = self.id_sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{}", task_type, Utc::now().timestamp_millis(), sequence)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start workers for every registered task type
    ///
    /// Does nothing if already running. Must be called from within a tokio
    /// runtime; workers registered later are spawned on the same runtime.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        let _guard = self.lifecycle_lock.lock().await;

        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.is_some() {
            debug!("Task manager already running");
            return;
        }

        let runtime = tokio::runtime::Handle::current();
        let (shutdown_tx, _) = watch::channel(false);
        let workers = self.state.config.workers_per_type();

        let queues: Vec<_> = self
            .registered_types()
            .into_iter()
            .map(|task_type| {
                let queue = self.state.queue(&task_type);
                (task_type, queue)
            })
            .collect();

        let pools = queues
            .into_iter()
            .map(|(task_type, queue)| {
                let pool = WorkerPool::spawn(
                    &runtime,
                    Arc::clone(&self.state),
                    queue,
                    workers,
                    shutdown_tx.subscribe(),
                );
                (task_type, pool)
            })
            .collect::<HashMap<_, _>>();

        info!(
            task_types = pools.len(),
            workers_per_type = workers,
            "Task manager started"
        );

        *lifecycle = Some(Lifecycle {
            runtime,
            shutdown_tx,
            pools,
        });
    }

    /// Stop all workers and wait for them to exit
    ///
    /// Handlers already running finish their current attempt. Queued tasks
    /// stay queued and resume on the next [`start`](Self::start).
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let _guard = self.lifecycle_lock.lock().await;

        let lifecycle = self.lifecycle.lock().take();
        let Some(lifecycle) = lifecycle else {
            debug!("Task manager not running");
            return;
        };

        info!("Stopping task manager");
        if lifecycle.shutdown_tx.send(true).is_err() {
            warn!("No workers were listening for shutdown");
        }

        futures::future::join_all(lifecycle.pools.into_values().map(WorkerPool::join)).await;

        info!("Task manager stopped");
    }

    /// Whether workers are running
    pub fn is_running(&self) -> bool {
        self.lifecycle.lock().is_some()
    }

    // =========================================================================
    // Status & stats
    // =========================================================================

    /// Snapshot of one task record
    pub fn get_status(&self, task_id: &str) -> Option<TaskRecord> {
        self.state.table.read().tasks.get(task_id).cloned()
    }

    /// Counts, queue depths, running flag and metrics
    pub fn get_stats(&self) -> QueueStats {
        let (total_tasks, status_counts, metrics) = {
            let table = self.state.table.read();

            let mut status_counts: BTreeMap<TaskStatus, usize> = [
                TaskStatus::Pending,
                TaskStatus::Processing,
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Retrying,
            ]
            .into_iter()
            .map(|status| (status, 0))
            .collect();

            for record in table.tasks.values() {
                *status_counts.entry(record.status).or_insert(0) += 1;
            }

            (table.tasks.len(), status_counts, table.metrics.snapshot())
        };

        let queue_depths = self
            .state
            .queues
            .read()
            .iter()
            .map(|(task_type, queue)| (task_type.clone(), queue.len()))
            .collect();

        QueueStats {
            total_tasks,
            status_counts,
            queue_depths,
            is_running: self.is_running(),
            metrics,
        }
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Remove terminal records that finished more than `max_age` ago
    ///
    /// Pending, processing and retrying records are never removed.
    pub fn cleanup_old(&self, max_age: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let mut table = self.state.table.write();
        let before = table.tasks.len();
        table.tasks.retain(|_, record| {
            !(record.is_terminal() && record.completed_at.is_some_and(|done| done < cutoff))
        });
        let removed = before - table.tasks.len();

        if removed > 0 {
            info!(removed, max_age_secs = max_age.as_secs(), "Cleaned up old tasks");
        }
        removed
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("config", &self.state.config)
            .field("registry", &*self.state.registry.read())
            .field("is_running", &self.is_running())
            .finish()
    }
}
