// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Switchboard message router.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Switchboard crates.
#[derive(Debug, Error)]
pub enum SwitchboardError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage errors that may succeed on retry (busy/locked database, lost connection).
    #[error("transient storage error: {source}")]
    TransientStorage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Storage errors that will not resolve by retrying.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A record the operation depends on does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The downstream agent call failed.
    #[error("dispatch error: {message}")]
    Dispatch {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The agent answered but refused the request (authentication, malformed
    /// request). Retrying the same call cannot succeed.
    #[error("agent rejected request with status {status}: {message}")]
    AgentRejected { status: u16, message: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// A circuit breaker rejected the call without invoking it.
    #[error("circuit `{name}` is open, retry after {retry_after:?}")]
    CircuitOpen { name: String, retry_after: Duration },

    /// The user's upstream resource handle is already attached.
    #[error("resource handle for user {user_id} is already attached")]
    AlreadyAttached { user_id: i64 },

    /// A plugin's response handler does not match the delivery contract.
    #[error("plugin `{plugin}` rejected: {reason}")]
    HandlerContract { plugin: String, reason: String },

    /// A plugin failed to start or stop.
    #[error("plugin `{plugin}` lifecycle error: {source}")]
    PluginLifecycle {
        plugin: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Delivering a response back to its platform failed.
    #[error("delivery to `{platform}` failed: {message}")]
    Delivery { platform: String, message: String },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SwitchboardError {
    /// Shorthand for a [`SwitchboardError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`SwitchboardError::Dispatch`] without a source.
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch {
            message: message.into(),
            source: None,
        }
    }

    /// Returns true for storage errors worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStorage { .. })
    }

    /// Returns true for errors a dispatch retry loop may try again.
    ///
    /// Missing dependencies, agent rejections and contract violations will not
    /// fix themselves, and an open circuit is already a decision not to call.
    pub fn is_retryable_dispatch(&self) -> bool {
        matches!(
            self,
            Self::Dispatch { .. } | Self::Timeout { .. } | Self::TransientStorage { .. }
        )
    }

    /// Returns true when a required record is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let busy = SwitchboardError::TransientStorage {
            source: "database is locked".into(),
        };
        let broken = SwitchboardError::Storage {
            source: "no such table: queue".into(),
        };
        assert!(busy.is_transient());
        assert!(!broken.is_transient());
    }

    #[test]
    fn dispatch_retry_classification() {
        assert!(SwitchboardError::dispatch("502 from agent").is_retryable_dispatch());
        assert!(
            SwitchboardError::Timeout {
                duration: Duration::from_secs(5)
            }
            .is_retryable_dispatch()
        );
        assert!(!SwitchboardError::not_found("message", 7).is_retryable_dispatch());
        let rejected = SwitchboardError::AgentRejected {
            status: 401,
            message: "bad key".into(),
        };
        assert!(!rejected.is_retryable_dispatch());
        assert_eq!(
            rejected.to_string(),
            "agent rejected request with status 401: bad key"
        );
        assert!(
            !SwitchboardError::CircuitOpen {
                name: "agent".into(),
                retry_after: Duration::from_secs(1)
            }
            .is_retryable_dispatch()
        );
    }

    #[test]
    fn not_found_display() {
        let err = SwitchboardError::not_found("platform profile", 42);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "platform profile not found: 42");
    }
}
