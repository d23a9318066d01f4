//! Retry policy and backoff computation.
//!
//! A [`RetryPolicy`] is built once at startup, validated, and shared read-only
//! by every invocation through [`RetryExecutor`].

pub mod events;
pub mod executor;

use std::collections::HashSet;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::error::{ClassifiedError, ErrorKind};

pub use events::{MemorySink, RetryEvent, RetrySink, TracingSink};
pub use executor::{with_retry, RetryExecutor};

/// Lower bound for any computed (non-hinted) backoff delay.
pub const MIN_BACKOFF_MS: u64 = 100;

/// Jitter applied to computed delays, as a fraction of the delay.
pub const JITTER_FRACTION: f64 = 0.10;

/// Errors raised when a retry policy is constructed with invalid values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    #[error("base_delay_ms ({base}) must not exceed max_delay_ms ({max})")]
    BaseExceedsMax { base: u64, max: u64 },
}

/// How a wrapped remote operation is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
    jitter: bool,
    retryable_kinds: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    /// 3 attempts, 1s base delay, 30s cap, jitter on, retrying rate limits
    /// and network errors.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: true,
            retryable_kinds: ErrorKind::default_retryable(),
        }
    }
}

impl RetryPolicy {
    /// Creates a validated policy retrying the default kinds.
    pub fn new(
        max_attempts: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
        jitter: bool,
    ) -> Result<Self, PolicyError> {
        Self::with_kinds(
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            jitter,
            ErrorKind::default_retryable(),
        )
    }

    /// Creates a validated policy with an explicit set of retryable kinds.
    pub fn with_kinds(
        max_attempts: u32,
        base_delay_ms: u64,
        max_delay_ms: u64,
        jitter: bool,
        retryable_kinds: HashSet<ErrorKind>,
    ) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if base_delay_ms > max_delay_ms {
            return Err(PolicyError::BaseExceedsMax {
                base: base_delay_ms,
                max: max_delay_ms,
            });
        }
        Ok(Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            jitter,
            retryable_kinds,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    pub fn retryable_kinds(&self) -> &HashSet<ErrorKind> {
        &self.retryable_kinds
    }

    /// Whether a failure on the 0-indexed `attempt` should be retried.
    pub fn should_retry(&self, attempt: u32, error: &ClassifiedError) -> bool {
        error.is_retryable
            && self.retryable_kinds.contains(&error.kind)
            && attempt + 1 < self.max_attempts
    }

    /// Exponential backoff for the 0-indexed `attempt`, without jitter:
    /// `min(base * 2^attempt, max)`, floored at [`MIN_BACKOFF_MS`].
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        self.capped_backoff_ms(attempt).max(MIN_BACKOFF_MS)
    }

    fn capped_backoff_ms(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(1u64 << attempt.min(63))
            .min(self.max_delay_ms)
    }

    /// Delay before the attempt following a failed `attempt`.
    ///
    /// An explicit rate-limit hint is used exactly. Otherwise the exponential
    /// backoff is perturbed by up to ±10% when jitter is enabled and floored
    /// at [`MIN_BACKOFF_MS`].
    pub fn delay_for(&self, attempt: u32, error: &ClassifiedError) -> Duration {
        if let Some(hint) = error.retry_after_ms {
            return Duration::from_millis(hint);
        }

        let capped = self.capped_backoff_ms(attempt);

        let millis = if self.jitter {
            let factor = rand::thread_rng().gen_range(-JITTER_FRACTION..=JITTER_FRACTION);
            (capped as f64 * (1.0 + factor)).round() as u64
        } else {
            capped
        };

        Duration::from_millis(millis.max(MIN_BACKOFF_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(base: u64, max: u64) -> RetryPolicy {
        RetryPolicy::new(5, base, max, false).unwrap()
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay_ms(), 1000);
        assert_eq!(policy.max_delay_ms(), 30_000);
        assert!(policy.jitter());
        assert_eq!(policy.retryable_kinds(), &ErrorKind::default_retryable());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        assert_eq!(
            RetryPolicy::new(0, 100, 1000, false),
            Err(PolicyError::ZeroAttempts)
        );
    }

    #[test]
    fn test_rejects_base_above_max() {
        assert_eq!(
            RetryPolicy::new(3, 5000, 1000, false),
            Err(PolicyError::BaseExceedsMax {
                base: 5000,
                max: 1000
            })
        );
    }

    #[test]
    fn test_backoff_exponential_growth() {
        let policy = no_jitter(1000, 30_000);
        let error = ClassifiedError::new(ErrorKind::NetworkError, "reset");

        for (attempt, expected) in [(0, 1000), (1, 2000), (2, 4000), (3, 8000), (4, 16000)] {
            assert_eq!(
                policy.delay_for(attempt, &error),
                Duration::from_millis(expected)
            );
            assert_eq!(policy.backoff_ms(attempt), expected);
        }
    }

    #[test]
    fn test_backoff_respects_max_delay() {
        let policy = no_jitter(10_000, 30_000);
        let error = ClassifiedError::new(ErrorKind::NetworkError, "reset");

        assert_eq!(policy.delay_for(1, &error), Duration::from_millis(20_000));
        assert_eq!(policy.delay_for(2, &error), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(10, &error), Duration::from_millis(30_000));
    }

    #[test]
    fn test_backoff_floor() {
        let policy = no_jitter(10, 50);
        let error = ClassifiedError::new(ErrorKind::NetworkError, "reset");

        assert_eq!(policy.delay_for(0, &error), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3, &error), Duration::from_millis(100));
    }

    #[test]
    fn test_backoff_handles_overflow() {
        let policy = no_jitter(1000, u64::MAX);
        assert_eq!(policy.backoff_ms(200), u64::MAX);
    }

    #[test]
    fn test_backoff_matches_formula() {
        for base in [0u64, 50, 100, 250, 1000] {
            for max in [base, base * 3, 30_000] {
                let policy = no_jitter(base, max);
                let error = ClassifiedError::new(ErrorKind::NetworkError, "reset");
                for attempt in 0..8u32 {
                    let expected = (base * 2u64.pow(attempt)).min(max).max(100);
                    assert_eq!(
                        policy.delay_for(attempt, &error),
                        Duration::from_millis(expected)
                    );
                }
            }
        }
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = RetryPolicy::new(5, 10_000, 60_000, true).unwrap();
        let error = ClassifiedError::new(ErrorKind::NetworkError, "reset");

        for _ in 0..200 {
            let delay = policy.delay_for(0, &error);
            assert!(delay >= Duration::from_millis(9000), "{:?}", delay);
            assert!(delay <= Duration::from_millis(11_000), "{:?}", delay);
        }
    }

    #[test]
    fn test_retry_after_hint_takes_precedence() {
        let policy = no_jitter(1000, 30_000);
        let error = ClassifiedError::new(ErrorKind::RateLimited, "slow down")
            .with_retry_after_ms(4200);

        assert_eq!(policy.delay_for(0, &error), Duration::from_millis(4200));
        assert_eq!(policy.delay_for(3, &error), Duration::from_millis(4200));

        let tiny = ClassifiedError::new(ErrorKind::RateLimited, "slow down").with_retry_after_ms(5);
        assert_eq!(policy.delay_for(0, &tiny), Duration::from_millis(5));
    }

    #[test]
    fn test_should_retry_rules() {
        let policy = RetryPolicy::new(3, 100, 1000, false).unwrap();
        let network = ClassifiedError::new(ErrorKind::NetworkError, "reset");
        let not_found = ClassifiedError::new(ErrorKind::NotFound, "gone");

        assert!(policy.should_retry(0, &network));
        assert!(policy.should_retry(1, &network));
        assert!(!policy.should_retry(2, &network));
        assert!(!policy.should_retry(0, &not_found));
    }

    #[test]
    fn test_should_retry_requires_kind_in_policy() {
        let only_rate_limits = HashSet::from([ErrorKind::RateLimited]);
        let policy = RetryPolicy::with_kinds(3, 100, 1000, false, only_rate_limits).unwrap();
        let network = ClassifiedError::new(ErrorKind::NetworkError, "reset");

        assert!(network.is_retryable);
        assert!(!policy.should_retry(0, &network));
    }

    #[test]
    fn test_should_retry_requires_retryable_flag() {
        let policy = RetryPolicy::with_kinds(
            3,
            100,
            1000,
            false,
            HashSet::from([ErrorKind::Unknown]),
        )
        .unwrap();
        let unknown = ClassifiedError::new(ErrorKind::Unknown, "odd");
        assert!(!policy.should_retry(0, &unknown));

        let unknown_5xx = unknown.retryable(true);
        assert!(policy.should_retry(0, &unknown_5xx));
    }
}
