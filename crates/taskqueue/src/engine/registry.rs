//! Handler registry
//!
//! Maps task type names to exactly one handler. Registering a type twice
//! replaces the earlier handler.

use std::collections::HashMap;
use std::fmt;

use crate::task::Handler;

/// Registry of task handlers keyed by task type
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, returning the one it replaced
    pub fn register(&mut self, task_type: impl Into<String>, handler: Handler) -> Option<Handler> {
        self.handlers.insert(task_type.into(), handler)
    }

    /// Look up the handler for a task type
    pub fn get(&self, task_type: &str) -> Option<Handler> {
        self.handlers.get(task_type).cloned()
    }

    /// Check if a task type is registered
    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    /// Get the number of registered task types
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Get all registered task type names
    pub fn task_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(|s| s.as_str())
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("HandlerRegistry")
            .field("task_types", &types)
            .finish()
    }
}
