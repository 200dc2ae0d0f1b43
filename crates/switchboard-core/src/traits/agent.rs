// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client trait for the downstream conversational agent.

use async_trait::async_trait;

use crate::error::SwitchboardError;

/// The downstream agent service.
///
/// `attach`/`detach` bracket a `live` dispatch with the user's exclusive
/// resource handle on the shared upstream context.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Sends a formatted message and returns the agent's reply.
    async fn dispatch(&self, user_id: i64, formatted_text: &str) -> Result<String, SwitchboardError>;

    /// Attaches the user's resource handle.
    ///
    /// Returns [`SwitchboardError::AlreadyAttached`] when it is still attached
    /// from an earlier dispatch, and [`SwitchboardError::NotFound`] when the
    /// user has no handle provisioned.
    async fn attach(&self, user_id: i64) -> Result<(), SwitchboardError>;

    /// Detaches the user's resource handle.
    async fn detach(&self, user_id: i64) -> Result<(), SwitchboardError>;
}
