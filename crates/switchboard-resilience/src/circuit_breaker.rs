// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consecutive-failure circuit breaker.
//!
//! `Closed` lets calls through and counts consecutive failures. Reaching the
//! threshold opens the circuit; `Open` rejects calls until the cooldown has
//! elapsed, after which exactly one probe is admitted in `HalfOpen`. The probe
//! outcome either closes the circuit or reopens it with a fresh timer.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use switchboard_core::SwitchboardError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// State of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Set while the half-open probe is outstanding.
    probe_started: Option<Instant>,
}

/// A circuit breaker shared by every caller of one dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker that opens after `failure_threshold`
    /// consecutive failures and stays open for `timeout`.
    pub fn new(name: impl Into<String>, failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_started: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state as last recorded. An open breaker whose cooldown has
    /// elapsed still reports `Open` until the next call is admitted as a probe.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Returns true if a call made now would be rejected.
    pub fn is_open(&self) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => !self.cooldown_elapsed(&inner),
            CircuitState::HalfOpen => self.probe_outstanding(&inner),
        }
    }

    /// Asks permission to make one call.
    ///
    /// Returns [`SwitchboardError::CircuitOpen`] while open. After the cooldown
    /// the first caller is admitted as the half-open probe; others are still
    /// rejected until the probe reports back.
    pub fn try_acquire(&self) -> Result<(), SwitchboardError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                if self.cooldown_elapsed(&inner) {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_started = Some(Instant::now());
                    info!(circuit = %self.name, "cooldown elapsed, admitting probe call");
                    Ok(())
                } else {
                    Err(self.rejection(&inner))
                }
            }
            CircuitState::HalfOpen => {
                if self.probe_outstanding(&inner) {
                    Err(self.rejection(&inner))
                } else {
                    // The previous probe never reported back (its caller was
                    // cancelled); admit a new one.
                    inner.probe_started = Some(Instant::now());
                    Ok(())
                }
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            info!(circuit = %self.name, "probe succeeded, closing circuit");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.probe_started = None;
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.failure_threshold {
                    warn!(
                        circuit = %self.name,
                        failures = inner.consecutive_failures,
                        "failure threshold reached, opening circuit"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                } else {
                    debug!(
                        circuit = %self.name,
                        failures = inner.consecutive_failures,
                        "failure recorded"
                    );
                }
            }
            CircuitState::HalfOpen => {
                warn!(circuit = %self.name, "probe failed, reopening circuit");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_started = None;
            }
            // A call admitted before the circuit opened; keep the current timer.
            CircuitState::Open => {}
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cooldown_elapsed(&self, inner: &Inner) -> bool {
        inner
            .opened_at
            .is_none_or(|opened| opened.elapsed() >= self.timeout)
    }

    fn probe_outstanding(&self, inner: &Inner) -> bool {
        inner
            .probe_started
            .is_some_and(|started| started.elapsed() < self.timeout)
    }

    fn rejection(&self, inner: &Inner) -> SwitchboardError {
        let retry_after = inner
            .opened_at
            .map(|opened| self.timeout.saturating_sub(opened.elapsed()))
            .unwrap_or(Duration::ZERO);
        SwitchboardError::CircuitOpen {
            name: self.name.clone(),
            retry_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(breaker: &CircuitBreaker, n: u32) {
        for _ in 0..n {
            breaker.try_acquire().unwrap();
            breaker.record_failure();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new("agent", 3, Duration::from_secs(30));
        trip(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
        trip(&breaker, 1);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.is_open());

        let err = breaker.try_acquire().unwrap_err();
        assert!(matches!(err, SwitchboardError::CircuitOpen { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_the_failure_count() {
        let breaker = CircuitBreaker::new("agent", 3, Duration::from_secs(30));
        trip(&breaker, 2);
        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 0);
        trip(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn admits_exactly_one_probe_after_timeout() {
        let breaker = CircuitBreaker::new("agent", 1, Duration::from_secs(10));
        trip(&breaker, 1);
        assert!(breaker.try_acquire().is_err());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.try_acquire().is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        // Second caller while the probe is outstanding is rejected.
        assert!(breaker.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn probe_success_closes_circuit() {
        let breaker = CircuitBreaker::new("agent", 2, Duration::from_secs(5));
        trip(&breaker, 2);
        tokio::time::advance(Duration::from_secs(5)).await;
        breaker.try_acquire().unwrap();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.consecutive_failures(), 0);
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_reopens_with_fresh_timer() {
        let breaker = CircuitBreaker::new("agent", 1, Duration::from_secs(5));
        trip(&breaker, 1);
        tokio::time::advance(Duration::from_secs(5)).await;
        breaker.try_acquire().unwrap();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(breaker.try_acquire().is_err());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_reports_remaining_cooldown() {
        let breaker = CircuitBreaker::new("agent", 1, Duration::from_secs(8));
        trip(&breaker, 1);
        tokio::time::advance(Duration::from_secs(3)).await;
        match breaker.try_acquire() {
            Err(SwitchboardError::CircuitOpen { name, retry_after }) => {
                assert_eq!(name, "agent");
                assert_eq!(retry_after, Duration::from_secs(5));
            }
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }

    #[test]
    fn zero_threshold_behaves_like_one() {
        let breaker = CircuitBreaker::new("agent", 0, Duration::from_secs(1));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
