//! Retry policies
//!
//! A policy drives a [`RetryCallback`] until it succeeds or the attempt
//! budget runs out. The outcome carries the last failure so callers can
//! surface the concrete cause.

use crate::error::RuntimeError;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Unit of work a policy may run several times
#[async_trait]
pub trait RetryCallback: Send + Sync {
    /// Run one attempt
    async fn attempt(&self) -> Result<(), RuntimeError>;

    /// Human readable description used in logs
    fn description(&self) -> String;
}

/// Result of running a callback under a policy
#[derive(Debug)]
pub struct RetryOutcome {
    /// Number of attempts made
    pub attempts: u32,

    /// Failure of the final attempt, if it failed
    pub last_failure: Option<RuntimeError>,
}

impl RetryOutcome {
    /// Whether the callback eventually succeeded
    pub fn is_ok(&self) -> bool {
        self.last_failure.is_none()
    }
}

/// Strategy for re-running failed work
#[async_trait]
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    /// Run `callback` until it succeeds or the policy gives up
    async fn execute(&self, callback: &dyn RetryCallback) -> RetryOutcome;
}

async fn run_attempts<F>(max_attempts: u32, callback: &dyn RetryCallback, delay: F) -> RetryOutcome
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    let max_attempts = max_attempts.max(1);
    let mut last_failure = None;

    for attempt in 0..max_attempts {
        match callback.attempt().await {
            Ok(()) => {
                if attempt > 0 {
                    debug!(
                        work = %callback.description(),
                        attempts = attempt + 1,
                        "Succeeded after retry"
                    );
                }
                return RetryOutcome {
                    attempts: attempt + 1,
                    last_failure: None,
                };
            }
            Err(e) => {
                if attempt + 1 < max_attempts {
                    let wait = delay(attempt);
                    warn!(
                        work = %callback.description(),
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = wait.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                } else {
                    warn!(
                        work = %callback.description(),
                        attempts = max_attempts,
                        error = %e,
                        "Retries exhausted"
                    );
                }
                last_failure = Some(e);
            }
        }
    }

    RetryOutcome {
        attempts: max_attempts,
        last_failure,
    }
}

/// Fixed number of attempts separated by a fixed frequency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleRetryPolicy {
    max_attempts: u32,
    frequency: Duration,
}

impl SimpleRetryPolicy {
    /// Default pause between attempts
    pub const DEFAULT_FREQUENCY: Duration = Duration::from_millis(2000);

    /// Create a policy making at most `max_attempts` attempts
    pub fn new(max_attempts: u32, frequency: Duration) -> Self {
        Self {
            max_attempts,
            frequency,
        }
    }

    /// Maximum number of attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause between attempts
    pub fn frequency(&self) -> Duration {
        self.frequency
    }
}

#[async_trait]
impl RetryPolicy for SimpleRetryPolicy {
    async fn execute(&self, callback: &dyn RetryCallback) -> RetryOutcome {
        let frequency = self.frequency;
        run_attempts(self.max_attempts, callback, move |_| frequency).await
    }
}

/// Exponential backoff between attempts
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffRetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl BackoffRetryPolicy {
    /// Create a policy making at most `max_attempts` attempts
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
            max_delay,
        }
    }

    /// Maximum number of attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the failed attempt numbered `attempt` (0-based), capped
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

impl Default for BackoffRetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(500), 2.0, Duration::from_secs(30))
    }
}

#[async_trait]
impl RetryPolicy for BackoffRetryPolicy {
    async fn execute(&self, callback: &dyn RetryCallback) -> RetryOutcome {
        run_attempts(self.max_attempts, callback, |attempt| {
            self.delay_for_attempt(attempt)
        })
        .await
    }
}
