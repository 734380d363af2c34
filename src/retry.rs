//! Retry Executor
//!
//! Runs one unreliable external operation with a bounded number of attempts and a
//! fixed or linearly increasing delay between them. Failures are classified with
//! [`ApiError::is_transient`]; an `accept` predicate additionally lets callers treat
//! a successful-but-useless result (an "unable to determine" sentinel, an empty
//! answer) as transient.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Delay inserted after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayPolicy {
    Fixed(Duration),
    /// `initial` after the first failure, growing by `step` after each further one.
    Linear { initial: Duration, step: Duration },
}

impl DelayPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            DelayPolicy::Fixed(delay) => delay,
            DelayPolicy::Linear { initial, step } => {
                initial + step.saturating_mul(attempt.saturating_sub(1))
            }
        }
    }
}

/// Attempt budget and delay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: DelayPolicy,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay: DelayPolicy::Fixed(delay),
        }
    }

    pub fn linear(max_attempts: u32, initial: Duration, step: Duration) -> Self {
        Self {
            max_attempts,
            delay: DelayPolicy::Linear { initial, step },
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }
}

/// Retry settings as they appear in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first failed attempt (milliseconds)
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Added to the delay after every further failed attempt (milliseconds)
    #[serde(default)]
    pub increment_ms: u64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            increment_ms: 0,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        let initial = Duration::from_millis(config.delay_ms);
        if config.increment_ms == 0 {
            RetryPolicy::fixed(config.max_attempts, initial)
        } else {
            RetryPolicy::linear(
                config.max_attempts,
                initial,
                Duration::from_millis(config.increment_ms),
            )
        }
    }
}

/// Last thing observed before the attempt budget ran out.
#[derive(Debug)]
pub enum Exhaustion<T> {
    /// The operation returned a value the caller's predicate rejected.
    Rejected(T),
    /// The operation failed with a transient error.
    Failed(ApiError),
}

/// Result of a retried operation that did not hit a fatal error.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { last: Exhaustion<T>, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Runs operations under one [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    label: &'static str,
}

impl RetryExecutor {
    pub fn new(label: &'static str, policy: RetryPolicy) -> Self {
        Self { policy, label }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until `accept` approves its value or attempts run out.
    ///
    /// The operation receives the 1-based attempt number. Fatal errors return
    /// `Err` immediately; transient errors and rejected values are retried, and the
    /// last of them is handed back in [`RetryOutcome::Exhausted`].
    pub async fn run<T, F, Fut, A>(
        &self,
        subject: &str,
        mut operation: F,
        accept: A,
    ) -> Result<RetryOutcome<T>, ApiError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
        A: Fn(&T) -> bool,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let last = match operation(attempt).await {
                Ok(value) if accept(&value) => {
                    if attempt > 1 {
                        debug!(
                            operation = self.label,
                            subject,
                            attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(RetryOutcome::Succeeded {
                        value,
                        attempts: attempt,
                    });
                }
                Ok(value) => {
                    warn!(
                        operation = self.label,
                        subject,
                        attempt,
                        max_attempts,
                        "Operation returned an unusable result"
                    );
                    Exhaustion::Rejected(value)
                }
                Err(err) if err.is_transient() => {
                    warn!(
                        operation = self.label,
                        subject,
                        attempt,
                        max_attempts,
                        error = %err,
                        "Transient failure"
                    );
                    Exhaustion::Failed(err)
                }
                Err(err) => return Err(err),
            };

            if attempt >= max_attempts {
                return Ok(RetryOutcome::Exhausted {
                    last,
                    attempts: attempt,
                });
            }

            let delay = self.policy.delay.delay_for(attempt);
            if !delay.is_zero() {
                sleep(delay).await;
            }
        }
    }
}
