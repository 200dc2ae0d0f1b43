// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read/write contract the processor needs from message persistence.

use async_trait::async_trait;

use crate::error::SwitchboardError;
use crate::types::{MessageText, PlatformProfileRef, UserDisplayInfo};

/// Narrow view of the message/user/profile store.
///
/// Lookups return `Ok(None)` when the record does not exist so the caller can
/// tell a missing dependency apart from a storage failure.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Role and text of a stored message.
    async fn fetch_message_text(
        &self,
        message_id: i64,
    ) -> Result<Option<MessageText>, SwitchboardError>;

    /// Display name and username of a user.
    async fn fetch_user_display_info(
        &self,
        user_id: i64,
    ) -> Result<Option<UserDisplayInfo>, SwitchboardError>;

    /// Platform profile a user's responses are delivered to.
    async fn fetch_platform_profile_ref(
        &self,
        user_id: i64,
    ) -> Result<Option<PlatformProfileRef>, SwitchboardError>;

    /// Stores the response produced for a message.
    async fn write_response(&self, message_id: i64, text: &str) -> Result<(), SwitchboardError>;
}
