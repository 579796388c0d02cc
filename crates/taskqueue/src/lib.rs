//! # In-process Task Queue
//!
//! A tokio-based background task manager for work that should not block the
//! caller: recomputing aggregates, rebuilding caches, batch jobs.
//!
//! ## Features
//!
//! - **Named task types**: each type maps to one async or blocking handler
//! - **Bounded worker pools**: a fixed number of workers per type, FIFO per type
//! - **Automatic retries**: retryable failures are re-queued after `2^k` backoff
//! - **Status and metrics**: per-task records plus aggregate counters
//!
//! Everything lives in memory. Queued and finished tasks are lost when the
//! process exits.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TaskManager                          │
//! │  (registry, submit, start/stop, status, stats, cleanup)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  TaskQueue (one per type)                   │
//! │  (FIFO of task ids, wakes one waiting worker per push)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  WorkerPool (one per type)                  │
//! │  (dequeues, runs handlers, records results, retries)        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use taskqueue::prelude::*;
//!
//! let manager = TaskManager::new(ManagerConfig::from_env()?);
//!
//! manager.register_fn("recompute_stats", |payload| async move {
//!     let id = payload["competition_id"]
//!         .as_i64()
//!         .ok_or_else(|| HandlerError::permanent("missing competition_id"))?;
//!     Ok(json!({ "competition_id": id }))
//! });
//!
//! manager.start().await;
//! let task_id = manager.submit("recompute_stats", json!({ "competition_id": 7 }))?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod reliability;
pub mod task;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{BlockingPoolScope, ManagerConfig};
    pub use crate::engine::{QueueStats, SubmitOptions, TaskManager};
    pub use crate::error::QueueError;
    pub use crate::reliability::BackoffPolicy;
    pub use crate::task::{
        HandlerError, HandlerResult, TaskHandler, TaskRecord, TaskStatus,
    };
    pub use async_trait::async_trait;
    pub use serde_json::json;
}

// Re-export key types at crate root
pub use config::{BlockingPoolScope, ManagerConfig};
pub use engine::{HandlerRegistry, QueueStats, SubmitOptions, TaskManager};
pub use error::QueueError;
pub use metrics::{MetricsSnapshot, TaskMetrics};
pub use queue::TaskQueue;
pub use reliability::BackoffPolicy;
pub use task::{
    BlockingFn, FnHandler, Handler, HandlerError, HandlerMode, HandlerResult, TaskHandler,
    TaskRecord, TaskStatus,
};
