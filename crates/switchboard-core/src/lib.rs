// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Switchboard message router.
//!
//! This crate provides the error type, the queue and contract types, and the
//! traits for the external collaborators (message store, agent client,
//! platform plugins) used throughout the workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::SwitchboardError;
pub use types::{
    ItemId, MessageText, PlatformProfileRef, PluginEvent, ProcessingMode, QueueItem, QueueStats,
    QueueStatus, UserDisplayInfo,
};

pub use traits::{
    handler_fn, AgentClient, HandlerContract, MessageStore, PlatformPlugin, ResponseHandler,
};
