// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue processor for the Switchboard message router.
//!
//! The [`QueueProcessor`] is the central worker that:
//! - Claims queued items atomically, up to a concurrency limit
//! - Resolves message, user and profile context from the message store
//! - Dispatches in `echo`, `listen` or `live` mode
//! - Records responses and routes them through the handler registry
//! - Requeues failures with backoff and drains cleanly on shutdown

pub mod dispatch;
pub mod format;
pub mod processor;
pub mod shutdown;

pub use dispatch::{DispatchError, LiveDispatcher};
pub use format::{MessageContext, format_message};
pub use processor::{ProcessorConfig, ProcessorState, QueueProcessor};
pub use shutdown::install_signal_handler;
