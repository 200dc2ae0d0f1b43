// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence for Switchboard.
//!
//! WAL-mode SQLite with embedded migrations, accessed through `tokio-rusqlite`.
//! Holds the durable work queue and the users/messages/profiles tables behind
//! the [`MessageStore`](switchboard_core::MessageStore) contract.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod queries;

pub use adapter::{QueueStore, SqliteMessageStore, retry_config};
pub use database::Database;
