// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform metadata header prepended to each dispatched message.

use switchboard_core::{MessageText, PlatformProfileRef, UserDisplayInfo};

/// Everything the processor resolves about a claimed item before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    pub message: MessageText,
    pub user: UserDisplayInfo,
    pub profile: PlatformProfileRef,
}

/// Render the message for the agent.
///
/// ```text
/// [platform: telegram | user: Dana (@dana) | role: user]
/// hello there
/// ```
pub fn format_message(ctx: &MessageContext) -> String {
    let who = match ctx.user.username.as_deref() {
        Some(username) if !username.is_empty() => {
            format!("{} (@{username})", ctx.user.display_name)
        }
        _ => ctx.user.display_name.clone(),
    };
    format!(
        "[platform: {} | user: {who} | role: {}]\n{}",
        ctx.profile.platform, ctx.message.role, ctx.message.text
    )
}
