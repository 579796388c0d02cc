//! Exponential backoff between retry attempts

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{duration_millis, option_duration_millis};

/// Delay schedule for retried tasks
///
/// The wait before retry `k` (1-based) is `unit * 2^k`. There is no ceiling
/// unless `max_delay` is set.
///
/// # Example
///
/// ```
/// use taskqueue::BackoffPolicy;
/// use std::time::Duration;
///
/// let policy = BackoffPolicy::exponential().with_unit(Duration::from_millis(100));
///
/// assert_eq!(policy.delay_for_retry(1), Duration::from_millis(200));
/// assert_eq!(policy.delay_for_retry(2), Duration::from_millis(400));
/// assert_eq!(policy.delay_for_retry(3), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffPolicy {
    /// One time unit of the `2^k` schedule
    #[serde(with = "duration_millis")]
    pub unit: Duration,

    /// Optional upper bound on a single delay
    #[serde(with = "option_duration_millis", default)]
    pub max_delay: Option<Duration>,

    /// Jitter factor (0.0-1.0), 0.0 keeps delays exact
    #[serde(default)]
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl BackoffPolicy {
    /// One-second unit, no ceiling, no jitter
    pub fn exponential() -> Self {
        Self {
            unit: Duration::from_secs(1),
            max_delay: None,
            jitter: 0.0,
        }
    }

    /// Set the time unit
    pub fn with_unit(mut self, unit: Duration) -> Self {
        self.unit = unit;
        self
    }

    /// Cap every delay at `max`
    pub fn with_max_delay(mut self, max: Duration) -> Self {
        self.max_delay = Some(max);
        self
    }

    /// Set the jitter factor (0.0-1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait before retry number `retry` (1-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        // 0 * 2^k is 0 for every k; the float path below would give NaN once 2^k overflows
        if self.unit.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let base = self.unit.as_secs_f64() * 2f64.powi(exponent);
        let capped = match self.max_delay {
            Some(max) => base.min(max.as_secs_f64()),
            None => base,
        };

        let jittered = if self.jitter > 0.0 && capped > 0.0 && capped.is_finite() {
            let range = capped * self.jitter;
            let offset = rand::thread_rng().gen_range(-range..range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::try_from_secs_f64(jittered).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.unit, Duration::from_secs(1));
        assert!(policy.max_delay.is_none());
        assert_eq!(policy.jitter, 0.0);
    }

    #[test]
    fn test_power_of_two_schedule() {
        let policy = BackoffPolicy::exponential();

        assert_eq!(policy.delay_for_retry(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_retry(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_retry(3), Duration::from_secs(8));
    }

    #[test]
    fn test_delays_never_decrease() {
        let policy = BackoffPolicy::exponential().with_unit(Duration::from_millis(10));

        let mut previous = Duration::ZERO;
        for retry in 1..=20 {
            let delay = policy.delay_for_retry(retry);
            assert!(delay >= previous, "retry {retry}: {delay:?} < {previous:?}");
            previous = delay;
        }
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = BackoffPolicy::exponential().with_max_delay(Duration::from_secs(5));

        assert_eq!(policy.delay_for_retry(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_retry(3), Duration::from_secs(5));
        assert_eq!(policy.delay_for_retry(30), Duration::from_secs(5));
    }

    #[test]
    fn test_huge_retry_saturates() {
        let policy = BackoffPolicy::exponential();
        assert_eq!(policy.delay_for_retry(u32::MAX), Duration::MAX);
    }

    #[test]
    fn test_huge_retry_with_jitter_saturates() {
        let policy = BackoffPolicy::exponential().with_jitter(0.2);
        assert_eq!(policy.delay_for_retry(4096), Duration::MAX);
    }

    #[test]
    fn test_zero_unit_never_waits() {
        let policy = BackoffPolicy::exponential().with_unit(Duration::ZERO);

        assert_eq!(policy.delay_for_retry(1), Duration::ZERO);
        assert_eq!(policy.delay_for_retry(1024), Duration::ZERO);
        assert_eq!(policy.delay_for_retry(u32::MAX), Duration::ZERO);

        let jittered = policy.with_jitter(0.5);
        assert_eq!(jittered.delay_for_retry(2048), Duration::ZERO);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = BackoffPolicy::exponential().with_jitter(0.1);

        for _ in 0..50 {
            let delay = policy.delay_for_retry(2).as_secs_f64();
            assert!((3.6..=4.4).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_serialization() {
        let policy = BackoffPolicy::exponential()
            .with_unit(Duration::from_millis(250))
            .with_max_delay(Duration::from_secs(30));

        let json = serde_json::to_string(&policy).unwrap();
        let parsed: BackoffPolicy = serde_json::from_str(&json).unwrap();

        assert_eq!(policy, parsed);
    }
}
