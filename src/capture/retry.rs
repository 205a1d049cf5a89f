// Retry policy - exponential backoff for retryable acquisition failures
//
// Pure: decisions depend only on the attempt counter the caller supplies.
// Sequencing the retries (sleeping, re-acquiring) is the caller's job.

use std::time::Duration;

use thiserror::Error;

use super::errors::ClassifiedError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RetryPolicyError {
    #[error("initial delay must be positive")]
    ZeroInitialDelay,
    #[error("backoff multiplier must be greater than 1.0, got {0}")]
    MultiplierTooSmall(f64),
    #[error("max delay {max:?} is shorter than initial delay {initial:?}")]
    MaxBelowInitial { initial: Duration, max: Duration },
}

/// Backoff configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
        max_delay: Duration,
    ) -> Result<Self, RetryPolicyError> {
        if initial_delay.is_zero() {
            return Err(RetryPolicyError::ZeroInitialDelay);
        }
        if backoff_multiplier.is_nan() || backoff_multiplier <= 1.0 {
            return Err(RetryPolicyError::MultiplierTooSmall(backoff_multiplier));
        }
        if max_delay < initial_delay {
            return Err(RetryPolicyError::MaxBelowInitial {
                initial: initial_delay,
                max: max_delay,
            });
        }

        Ok(Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
            max_delay,
        })
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn backoff_multiplier(&self) -> f64 {
        self.backoff_multiplier
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// `min(initial * multiplier^attempt, max)`
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        // Overflowed products come back as inf and must not reach Duration
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Retry only while budget remains and the failure is retryable
    pub fn should_retry(&self, error: &ClassifiedError, attempt: u32) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }
}
