//! Handler trait and execution modes

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error returned by a handler
///
/// Retryable errors go through the backoff/retry cycle; permanent errors fail
/// the task on the spot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum HandlerError {
    /// Transient failure, try again after the backoff
    #[error("{0}")]
    Retryable(String),

    /// The task can never succeed
    #[error("{0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(m) | Self::Permanent(m) => m,
        }
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(err: anyhow::Error) -> Self {
        Self::Retryable(err.to_string())
    }
}

/// Result of a single handler invocation
pub type HandlerResult = Result<serde_json::Value, HandlerError>;

/// Performs the work for one task type
///
/// # Example
///
/// ```ignore
/// use taskqueue::prelude::*;
///
/// struct RecomputeStats;
///
/// #[async_trait]
/// impl TaskHandler for RecomputeStats {
///     async fn execute(&self, payload: serde_json::Value) -> HandlerResult {
///         let competition_id = payload["competition_id"]
///             .as_i64()
///             .ok_or_else(|| HandlerError::permanent("missing competition_id"))?;
///         // ...
///         Ok(json!({ "competition_id": competition_id }))
///     }
/// }
/// ```
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Run the handler against one payload
    async fn execute(&self, payload: serde_json::Value) -> HandlerResult;
}

/// Adapter turning an async closure into a [`TaskHandler`]
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn execute(&self, payload: serde_json::Value) -> HandlerResult {
        (self.f)(payload).await
    }
}

/// Synchronous handler function, run on the blocking pool
pub type BlockingFn = Arc<dyn Fn(serde_json::Value) -> HandlerResult + Send + Sync>;

/// How a handler is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerMode {
    /// Awaited inline on the runtime
    Async,
    /// Offloaded to the bounded blocking pool
    Blocking,
}

/// A registered handler together with its execution mode
#[derive(Clone)]
pub enum Handler {
    Async(Arc<dyn TaskHandler>),
    Blocking(BlockingFn),
}

impl Handler {
    pub fn mode(&self) -> HandlerMode {
        match self {
            Self::Async(_) => HandlerMode::Async,
            Self::Blocking(_) => HandlerMode::Blocking,
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Handler").field(&self.mode()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handler_error_kinds() {
        let err = HandlerError::retryable("timeout");
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "timeout");

        let err = HandlerError::permanent("invalid input");
        assert!(!err.is_retryable());
        assert_eq!(err.message(), "invalid input");
    }

    #[test]
    fn test_anyhow_errors_are_retryable() {
        let err: HandlerError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err, HandlerError::Retryable("connection reset".to_string()));
    }

    #[test]
    fn test_payload_errors_retry_unless_marked_permanent() {
        let parse = serde_json::from_value::<u32>(json!("seven")).unwrap_err();

        let err: HandlerError = anyhow::Error::from(parse).into();
        assert!(err.is_retryable());

        let parse = serde_json::from_value::<u32>(json!("seven")).unwrap_err();
        let err = HandlerError::permanent(format!("invalid payload: {parse}"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_handler_error_serialization() {
        let err = HandlerError::permanent("bad");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value, json!({"kind": "permanent", "message": "bad"}));
    }

    #[tokio::test]
    async fn test_fn_handler() {
        let handler = FnHandler::new(|payload: serde_json::Value| async move {
            Ok(json!(payload["n"].as_i64().unwrap_or(0) * 2))
        });

        let result = handler.execute(json!({"n": 21})).await;
        assert_eq!(result, Ok(json!(42)));
    }

    #[test]
    fn test_handler_mode() {
        let blocking = Handler::Blocking(Arc::new(|_: serde_json::Value| -> HandlerResult {
            Ok(json!(null))
        }));
        assert_eq!(blocking.mode(), HandlerMode::Blocking);
        assert_eq!(format!("{blocking:?}"), "Handler(Blocking)");
    }
}
