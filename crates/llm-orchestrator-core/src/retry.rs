// Copyright (c) 2025 LLM DevOps
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential-backoff retry, shared by the Model Client, the Agent, and
//! the Workflow Scheduler.
//!
//! Retry is specified at three independent layers that compose: the
//! caller at each layer owns its own [`RetryPolicy`] and decides, via
//! [`crate::error::Error::is_retryable`], whether a given failure is worth
//! waiting out.

use crate::error::Error;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Exponential-backoff policy with optional jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each attempt.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Whether to jitter the computed delay.
    pub use_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            use_jitter: true,
        }
    }
}

impl RetryPolicy {
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
            use_jitter: true,
        }
    }

    /// A policy with a single attempt and no waiting — used where a layer
    /// wants to disable its own retrying (e.g. the agent layer when the
    /// scheduler layer alone should own retry for a step).
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(0),
            multiplier: 1.0,
            max_delay: Duration::from_millis(0),
            use_jitter: false,
        }
    }

    /// Delay to wait before the attempt numbered `attempt` (0-indexed,
    /// counting the retry after the first failure as attempt 0).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        let capped = Duration::from_millis(base as u64).min(self.max_delay);

        if self.use_jitter {
            jitter(capped)
        } else {
            capped
        }
    }
}

fn jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_range = delay.as_millis() as f64 * 0.1;
    let offset = rng.gen_range(-jitter_range..=jitter_range);
    let jittered = (delay.as_millis() as f64 + offset).max(0.0);
    Duration::from_millis(jittered as u64)
}

/// Runs an async operation under a [`RetryPolicy`], retrying only on
/// errors for which [`Error::is_retryable`] holds.
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Executes `operation`, retrying transient failures.
    ///
    /// Returns the successful value, the number of the attempt that
    /// succeeded (1-indexed), or the last error once attempts are
    /// exhausted / a terminal error is hit.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> (Result<T, Error>, u32)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, Error>>,
    {
        let mut last_error = None;

        for attempt in 0..self.policy.max_attempts {
            match operation().await {
                Ok(value) => return (Ok(value), attempt + 1),
                Err(err) => {
                    let retryable = err.is_retryable();
                    last_error = Some(err);

                    if !retryable || attempt + 1 >= self.policy.max_attempts {
                        break;
                    }

                    sleep(self.policy.delay_for(attempt)).await;
                }
            }
        }

        (
            Err(last_error.unwrap_or_else(|| {
                Error::validation("retry executor finished without a recorded error")
            })),
            self.policy.max_attempts,
        )
    }
}
