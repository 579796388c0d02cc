//! Reliability patterns for task execution
//!
//! This module provides:
//! - [`BackoffPolicy`] - Exponential delay schedule between retry attempts

mod backoff;

pub use backoff::BackoffPolicy;
