// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrying front ends over the query modules.
//!
//! [`QueueStore`] is the queue API the processor and the CLI use;
//! [`SqliteMessageStore`] implements the [`MessageStore`] contract. Both retry
//! busy/locked failures with exponential backoff and let every other error
//! through on the first attempt.

use std::future::Future;

use async_trait::async_trait;
use switchboard_config::model::{RetrySettings, StorageConfig};
use switchboard_core::{
    ItemId, MessageStore, MessageText, PlatformProfileRef, QueueItem, QueueStats, QueueStatus,
    SwitchboardError, UserDisplayInfo,
};
use switchboard_resilience::{RetryConfig, exponential_backoff};
use tracing::{debug, info};

use crate::database::Database;
use crate::queries;

/// Storage retry policy from its config form.
pub fn retry_config(settings: &RetrySettings) -> RetryConfig {
    RetryConfig {
        max_retries: settings.max_retries,
        base_delay: std::time::Duration::from_millis(settings.base_delay_ms),
        max_delay: std::time::Duration::from_millis(settings.max_delay_ms),
        jitter: settings.jitter,
    }
}

async fn retrying<T, F, Fut>(retry: &RetryConfig, op: F) -> Result<T, SwitchboardError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SwitchboardError>>,
{
    exponential_backoff(op, retry, SwitchboardError::is_transient, None).await
}

/// The durable work queue.
#[derive(Clone)]
pub struct QueueStore {
    db: Database,
    retry: RetryConfig,
}

impl QueueStore {
    pub fn new(db: Database, retry: RetryConfig) -> Self {
        Self { db, retry }
    }

    /// Open the configured database and wrap it.
    pub async fn open(config: &StorageConfig, retry: RetryConfig) -> Result<Self, SwitchboardError> {
        let db = Database::open_with(&config.database_path, config.wal_mode).await?;
        Ok(Self::new(db, retry))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn enqueue(&self, user_id: i64, message_id: i64) -> Result<ItemId, SwitchboardError> {
        let id = retrying(&self.retry, || queries::queue::enqueue(&self.db, user_id, message_id)).await?;
        debug!(item_id = id, user_id, message_id, "enqueued");
        Ok(id)
    }

    /// Atomically claim the oldest pending item, or `None` if there is none
    /// (or another worker won the race).
    pub async fn claim_next(&self) -> Result<Option<QueueItem>, SwitchboardError> {
        retrying(&self.retry, || queries::queue::claim_next(&self.db)).await
    }

    /// Write a terminal status.
    pub async fn complete(&self, id: ItemId, status: QueueStatus) -> Result<(), SwitchboardError> {
        retrying(&self.retry, || queries::queue::complete(&self.db, id, status)).await
    }

    /// `true` if the item went back to `pending`, `false` if it is now `failed`.
    pub async fn requeue_or_fail(&self, id: ItemId, max_attempts: u32) -> Result<bool, SwitchboardError> {
        retrying(&self.retry, || {
            queries::queue::requeue_or_fail(&self.db, id, max_attempts)
        })
        .await
    }

    /// Return a `processing` item to `pending` without using an attempt.
    pub async fn release(&self, id: ItemId) -> Result<bool, SwitchboardError> {
        retrying(&self.retry, || queries::queue::release(&self.db, id)).await
    }

    /// Startup recovery: every `processing` row belongs to a dead worker.
    pub async fn recover_stale_processing(&self) -> Result<usize, SwitchboardError> {
        let n = retrying(&self.retry, || queries::queue::recover_stale_processing(&self.db)).await?;
        if n > 0 {
            info!(count = n, "recovered stale processing items");
        }
        Ok(n)
    }

    pub async fn flush_pending(&self) -> Result<usize, SwitchboardError> {
        let n = retrying(&self.retry, || queries::queue::flush_pending(&self.db)).await?;
        info!(count = n, "flushed pending items");
        Ok(n)
    }

    /// Operator retry of a `failed` item. `attempts` is kept and the attempt
    /// budget restarts from its current value. `false` if the item is not
    /// `failed`.
    pub async fn retry_failed(&self, id: ItemId) -> Result<bool, SwitchboardError> {
        retrying(&self.retry, || queries::queue::retry_failed(&self.db, id)).await
    }

    pub async fn get(&self, id: ItemId) -> Result<Option<QueueItem>, SwitchboardError> {
        retrying(&self.retry, || queries::queue::get(&self.db, id)).await
    }

    pub async fn list_by_status(
        &self,
        status: QueueStatus,
        limit: u32,
    ) -> Result<Vec<QueueItem>, SwitchboardError> {
        retrying(&self.retry, || queries::queue::list_by_status(&self.db, status, limit)).await
    }

    pub async fn stats(&self) -> Result<QueueStats, SwitchboardError> {
        retrying(&self.retry, || queries::queue::stats(&self.db)).await
    }
}

/// SQLite-backed [`MessageStore`], plus the write helpers ingestion needs.
#[derive(Clone)]
pub struct SqliteMessageStore {
    db: Database,
    retry: RetryConfig,
}

impl SqliteMessageStore {
    pub fn new(db: Database, retry: RetryConfig) -> Self {
        Self { db, retry }
    }

    pub async fn create_user(
        &self,
        display_name: &str,
        username: Option<&str>,
    ) -> Result<i64, SwitchboardError> {
        retrying(&self.retry, || {
            queries::users::create_user(&self.db, display_name, username)
        })
        .await
    }

    pub async fn create_platform_profile(
        &self,
        user_id: i64,
        platform: &str,
        platform_user_id: &str,
    ) -> Result<i64, SwitchboardError> {
        retrying(&self.retry, || {
            queries::users::create_platform_profile(&self.db, user_id, platform, platform_user_id)
        })
        .await
    }

    pub async fn insert_message(
        &self,
        user_id: i64,
        role: &str,
        content: &str,
    ) -> Result<i64, SwitchboardError> {
        retrying(&self.retry, || {
            queries::messages::insert_message(&self.db, user_id, role, content)
        })
        .await
    }

    /// Store an inbound user message and enqueue it. Returns `(message_id, item_id)`.
    pub async fn ingest(&self, user_id: i64, content: &str) -> Result<(i64, ItemId), SwitchboardError> {
        let ids = retrying(&self.retry, || queries::messages::ingest(&self.db, user_id, content)).await?;
        debug!(user_id, message_id = ids.0, item_id = ids.1, "ingested message");
        Ok(ids)
    }

    pub async fn get_response(&self, message_id: i64) -> Result<Option<String>, SwitchboardError> {
        retrying(&self.retry, || queries::messages::get_response(&self.db, message_id)).await
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn fetch_message_text(
        &self,
        message_id: i64,
    ) -> Result<Option<MessageText>, SwitchboardError> {
        retrying(&self.retry, || {
            queries::messages::get_message_text(&self.db, message_id)
        })
        .await
    }

    async fn fetch_user_display_info(
        &self,
        user_id: i64,
    ) -> Result<Option<UserDisplayInfo>, SwitchboardError> {
        retrying(&self.retry, || {
            queries::users::get_user_display_info(&self.db, user_id)
        })
        .await
    }

    async fn fetch_platform_profile_ref(
        &self,
        user_id: i64,
    ) -> Result<Option<PlatformProfileRef>, SwitchboardError> {
        retrying(&self.retry, || {
            queries::users::get_platform_profile_ref(&self.db, user_id)
        })
        .await
    }

    async fn write_response(&self, message_id: i64, text: &str) -> Result<(), SwitchboardError> {
        retrying(&self.retry, || {
            queries::messages::write_response(&self.db, message_id, text)
        })
        .await
    }
}
