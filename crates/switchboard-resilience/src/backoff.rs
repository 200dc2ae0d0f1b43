// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry with capped exponential backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use switchboard_core::SwitchboardError;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;

/// Retry budget and delay shape for [`exponential_backoff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero means a single attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `[0.5, 1.0]`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt + 1`, jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = backoff_delay(self.base_delay, self.max_delay, attempt);
        if self.jitter && !delay.is_zero() {
            let factor = rand::thread_rng().gen_range(0.5..=1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }
}

/// `min(base * 2^attempt, max)`, saturating instead of overflowing.
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// Runs `operation` until it succeeds, fails fatally, or the budget runs out.
///
/// Before every attempt the optional `breaker` is consulted; an open breaker
/// fails the call with [`SwitchboardError::CircuitOpen`] without invoking
/// `operation`. Successes and retryable failures are recorded on the breaker.
/// Errors for which `should_retry` returns false are returned immediately and
/// leave the breaker untouched; retryable errors are retried up to
/// `config.max_retries` times, and the last one is returned once the budget is
/// spent.
pub async fn exponential_backoff<T, F, Fut, P>(
    mut operation: F,
    config: &RetryConfig,
    should_retry: P,
    breaker: Option<&CircuitBreaker>,
) -> Result<T, SwitchboardError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SwitchboardError>>,
    P: Fn(&SwitchboardError) -> bool,
{
    let mut attempt: u32 = 0;
    loop {
        if let Some(breaker) = breaker {
            breaker.try_acquire()?;
        }

        let err = match operation().await {
            Ok(value) => {
                if let Some(breaker) = breaker {
                    breaker.record_success();
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !should_retry(&err) {
            // A refused call says nothing about the callee's health.
            debug!(error = %err, "non-retryable error");
            return Err(err);
        }
        if let Some(breaker) = breaker {
            breaker.record_failure();
        }
        if attempt >= config.max_retries {
            warn!(attempts = attempt + 1, error = %err, "retry budget exhausted");
            return Err(err);
        }

        let delay = config.delay_for(attempt);
        debug!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
