// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for Switchboard.
//!
//! - [`exponential_backoff`] retries a fallible async operation with capped,
//!   optionally jittered exponential delays, consulting a retry predicate so
//!   fatal errors surface immediately.
//! - [`CircuitBreaker`] stops calling a persistently failing dependency for a
//!   cooldown period, then lets a single probe call through.

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::{backoff_delay, exponential_backoff, RetryConfig};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
