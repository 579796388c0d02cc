//! Task abstractions
//!
//! - [`TaskRecord`] tracks one submitted unit of work through its lifecycle
//! - [`TaskHandler`] is implemented by collaborators to do the actual work

mod handler;
mod record;

pub use handler::{
    BlockingFn, FnHandler, Handler, HandlerError, HandlerMode, HandlerResult, TaskHandler,
};
pub use record::{FailureOutcome, TaskRecord, TaskStatus};
