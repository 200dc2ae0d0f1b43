// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for the collaborators the core talks to.
//!
//! All async traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod agent;
pub mod handler;
pub mod plugin;
pub mod store;

pub use agent::AgentClient;
pub use handler::{handler_fn, FnHandler, HandlerContract, ResponseHandler};
pub use plugin::PlatformPlugin;
pub use store::MessageStore;
