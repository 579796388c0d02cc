//! Task manager and handler registry

mod manager;
mod registry;
pub(crate) mod state;

pub use manager::{QueueStats, SubmitOptions, TaskManager};
pub use registry::HandlerRegistry;
