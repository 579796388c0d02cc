//! Task manager configuration
//!
//! Loaded from code via the builder methods or from `TASKQUEUE_*` environment
//! variables via [`ManagerConfig::from_env`].

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::reliability::BackoffPolicy;

/// Scope of the bounded pool that runs blocking handlers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingPoolScope {
    /// One pool shared by every task type
    #[default]
    Shared,
    /// Each task type gets its own pool of the same size
    PerType,
}

impl FromStr for BlockingPoolScope {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shared" | "" => Ok(Self::Shared),
            "per_type" | "per-type" | "pertype" => Ok(Self::PerType),
            _ => Err(QueueError::Config(format!(
                "unknown blocking pool scope: {s}. Use 'shared' or 'per_type'"
            ))),
        }
    }
}

/// Task manager configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManagerConfig {
    /// Upper bound on workers per task type and size of the blocking pool
    pub max_workers: usize,

    /// Fixed cap on workers per task type so one hot type cannot starve others
    pub per_type_worker_cap: usize,

    /// How long an idle worker waits on its queue before re-checking shutdown
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Retry ceiling used when a submission does not set one
    pub default_max_retries: u32,

    /// Delay schedule between attempts
    pub backoff: BackoffPolicy,

    /// Deadline for a single handler invocation (None = wait forever)
    #[serde(with = "option_duration_millis", default)]
    pub handler_timeout: Option<Duration>,

    /// Whether blocking handlers share one pool
    #[serde(default)]
    pub blocking_pool: BlockingPoolScope,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            per_type_worker_cap: 3,
            poll_interval: Duration::from_secs(1),
            default_max_retries: 3,
            backoff: BackoffPolicy::default(),
            handler_timeout: None,
            blocking_pool: BlockingPoolScope::Shared,
        }
    }
}

impl ManagerConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of workers
    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max.max(1);
        self
    }

    /// Set the per-type worker cap
    pub fn with_per_type_worker_cap(mut self, cap: usize) -> Self {
        self.per_type_worker_cap = cap.max(1);
        self
    }

    /// Set the idle poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the default retry ceiling
    pub fn with_default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = retries;
        self
    }

    /// Set the backoff policy
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set a handler execution deadline
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    /// Set the blocking pool scope
    pub fn with_blocking_pool(mut self, scope: BlockingPoolScope) -> Self {
        self.blocking_pool = scope;
        self
    }

    /// Number of workers started for each task type
    pub fn workers_per_type(&self) -> usize {
        self.max_workers.min(self.per_type_worker_cap).max(1)
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables (all optional):
    /// - `TASKQUEUE_MAX_WORKERS`: worker bound and blocking pool size (default: 5)
    /// - `TASKQUEUE_PER_TYPE_WORKER_CAP`: workers per task type cap (default: 3)
    /// - `TASKQUEUE_POLL_INTERVAL_MS`: idle queue wait (default: 1000)
    /// - `TASKQUEUE_DEFAULT_MAX_RETRIES`: retry ceiling (default: 3)
    /// - `TASKQUEUE_BACKOFF_UNIT_MS`: backoff time unit (default: 1000)
    /// - `TASKQUEUE_BACKOFF_MAX_MS`: backoff ceiling (default: none)
    /// - `TASKQUEUE_HANDLER_TIMEOUT_MS`: handler deadline (default: none)
    /// - `TASKQUEUE_BLOCKING_POOL`: `shared` or `per_type` (default: shared)
    pub fn from_env() -> Result<Self, QueueError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, QueueError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var::<usize, _>(&lookup, "TASKQUEUE_MAX_WORKERS")? {
            config = config.with_max_workers(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "TASKQUEUE_PER_TYPE_WORKER_CAP")? {
            config = config.with_per_type_worker_cap(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "TASKQUEUE_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "TASKQUEUE_DEFAULT_MAX_RETRIES")? {
            config.default_max_retries = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "TASKQUEUE_BACKOFF_UNIT_MS")? {
            config.backoff.unit = Duration::from_millis(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "TASKQUEUE_BACKOFF_MAX_MS")? {
            config.backoff.max_delay = Some(Duration::from_millis(v));
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "TASKQUEUE_HANDLER_TIMEOUT_MS")? {
            config.handler_timeout = Some(Duration::from_millis(v));
        }
        if let Some(v) = lookup("TASKQUEUE_BLOCKING_POOL") {
            config.blocking_pool = v.parse()?;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, QueueError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| QueueError::Config(format!("{key}={raw}: {e}"))),
        None => Ok(None),
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serde support for Option<Duration> as milliseconds
pub(crate) mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => d.as_millis().serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
