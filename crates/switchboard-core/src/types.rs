// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the queue, the processor, and the plugin registry.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier of a queue item (SQLite rowid).
pub type ItemId = i64;

/// Status of a queue item.
///
/// `Flushed` is produced only by the administrative flush operation and is
/// never entered by normal processing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Flushed,
}

impl QueueStatus {
    /// Terminal states are never left by normal processing.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Flushed)
    }
}

/// One unit of work: a stored message awaiting processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub user_id: i64,
    pub message_id: i64,
    pub status: QueueStatus,
    pub attempts: u32,
    /// ISO-8601 UTC timestamp of the last status transition.
    pub updated_at: String,
}

/// Item counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub flushed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed + self.flushed
    }
}

/// How the processor handles a claimed item.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Reply with the formatted message itself, no agent call.
    #[default]
    Echo,
    /// Mark items completed without producing or delivering a response.
    Listen,
    /// Call the downstream agent and deliver its response.
    Live,
}

/// Text and role of a stored inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageText {
    pub role: String,
    pub text: String,
}

/// How a user should be named in formatted messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDisplayInfo {
    pub display_name: String,
    pub username: Option<String>,
}

/// Reference to the platform-side identity a response is delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformProfileRef {
    pub profile_id: i64,
    pub platform_user_id: String,
    pub platform: String,
}

/// An event passed through the registry's synchronous event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEvent {
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl PluginEvent {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}
