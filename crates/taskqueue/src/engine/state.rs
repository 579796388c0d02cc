//! State shared between the manager and its workers

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::registry::HandlerRegistry;
use crate::config::ManagerConfig;
use crate::metrics::TaskMetrics;
use crate::queue::TaskQueue;
use crate::task::TaskRecord;
use crate::worker::BlockingExecutor;

/// Task records plus the metrics derived from their terminal transitions
///
/// Kept under one lock so a stats snapshot never sees a terminal record whose
/// metrics update is still pending.
#[derive(Debug, Default)]
pub(crate) struct TaskTable {
    pub tasks: HashMap<String, TaskRecord>,
    pub metrics: TaskMetrics,
}

/// Everything a worker needs, owned jointly by the manager and its workers
///
/// Locks are only held for short synchronous sections, never across `.await`.
#[derive(Debug)]
pub(crate) struct SharedState {
    pub config: ManagerConfig,
    pub registry: RwLock<HandlerRegistry>,
    pub queues: RwLock<HashMap<String, Arc<TaskQueue>>>,
    pub table: RwLock<TaskTable>,
    pub blocking: BlockingExecutor,
}

impl SharedState {
    pub fn new(config: ManagerConfig) -> Self {
        let blocking = BlockingExecutor::new(config.blocking_pool, config.max_workers);
        Self {
            config,
            registry: RwLock::new(HandlerRegistry::new()),
            queues: RwLock::new(HashMap::new()),
            table: RwLock::new(TaskTable::default()),
            blocking,
        }
    }

    /// Queue for a task type, created on first use
    pub fn queue(&self, task_type: &str) -> Arc<TaskQueue> {
        if let Some(queue) = self.queues.read().get(task_type) {
            return Arc::clone(queue);
        }

        let mut queues = self.queues.write();
        Arc::clone(
            queues
                .entry(task_type.to_string())
                .or_insert_with(|| Arc::new(TaskQueue::new(task_type))),
        )
    }
}
