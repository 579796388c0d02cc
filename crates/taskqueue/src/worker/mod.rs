//! Workers that drain the per-type queues
//!
//! This module provides:
//! - [`WorkerPool`] - Bounded set of workers consuming one task type's queue
//! - [`BlockingExecutor`] - Bounded offload pool for blocking handlers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    WorkerPool ("report")                      │
//! │   [worker 0]   [worker 1]   [worker 2]                        │
//! │        │  pop_timeout(poll_interval) / shutdown watch         │
//! │        ▼                                                      │
//! │   process_task ──▶ async handler (own tokio task)             │
//! │        │       └─▶ BlockingExecutor (semaphore + spawn_blocking)│
//! │        ▼                                                      │
//! │   Completed | Failed | Retrying ──backoff──▶ queue tail       │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod blocking;
mod execute;
mod pool;

pub use blocking::BlockingExecutor;
pub use pool::WorkerPool;
