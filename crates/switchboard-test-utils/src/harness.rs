// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a queue on a temp SQLite database, a message
//! store over the same file, a [`MockAgentClient`], and a registry that
//! discovered a [`MockPlatform`] through its factory. Timing knobs in `config` are shrunk so retry and poll
//! paths run in milliseconds.

use std::sync::Arc;
use std::time::Duration;

use switchboard_config::SwitchboardConfig;
use switchboard_config::model::StorageConfig;
use switchboard_core::{ItemId, ProcessingMode, QueueItem, QueueStatus, SwitchboardError};
use switchboard_plugin::{HandlerRegistry, StaticPluginSource};
use switchboard_storage::database::map_tr_err;
use switchboard_storage::{Database, QueueStore, SqliteMessageStore, retry_config};

use crate::mock_agent::MockAgentClient;
use crate::mock_platform::{MOCK_PLATFORM, MockPlatform, MockPlatformFactory};

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    agent: MockAgentClient,
    mode: ProcessingMode,
    max_attempts: u32,
    concurrency_limit: usize,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            agent: MockAgentClient::new(),
            mode: ProcessingMode::Echo,
            max_attempts: 3,
            concurrency_limit: 1,
        }
    }

    pub fn with_agent(mut self, agent: MockAgentClient) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Build the harness, creating the database and registering the mock platform.
    pub async fn build(self) -> Result<TestHarness, SwitchboardError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| SwitchboardError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db").to_string_lossy().to_string();

        let mut config = SwitchboardConfig::default();
        config.agent.mode = self.mode;
        config.agent.base_url = Some("http://agent.invalid".to_string());
        config.agent.dispatch_timeout_secs = 5;
        config.storage = StorageConfig {
            database_path: db_path,
            wal_mode: true,
        };
        config.queue.poll_interval_ms = 10;
        config.queue.max_attempts = self.max_attempts;
        config.queue.concurrency_limit = self.concurrency_limit;
        config.queue.backoff_base_ms = 1;
        config.queue.backoff_max_ms = 10;
        config.queue.shutdown_grace_secs = 5;
        config.queue.detach_grace_secs = 1;
        // One agent call per queue attempt keeps attempt counts exact.
        config.retry.max_retries = 0;
        config.retry.base_delay_ms = 1;
        config.retry.max_delay_ms = 5;
        config.retry.jitter = false;

        let retry = retry_config(&config.retry);
        let db = Database::open_with(&config.storage.database_path, config.storage.wal_mode).await?;
        let queue = QueueStore::new(db.clone(), retry.clone());
        let store = Arc::new(SqliteMessageStore::new(db, retry));

        let platform = Arc::new(MockPlatform::new());
        let registry = Arc::new(HandlerRegistry::new());
        let source = StaticPluginSource::new().with(MockPlatformFactory::new(platform.clone()));
        let report = registry.discover(&source, &config.plugin);
        if let Some((_, e)) = report.rejected.into_iter().next() {
            return Err(e);
        }

        Ok(TestHarness {
            queue,
            store,
            agent: Arc::new(self.agent),
            platform,
            registry,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete Switchboard stack on a temp database.
pub struct TestHarness {
    pub queue: QueueStore,
    pub store: Arc<SqliteMessageStore>,
    pub agent: Arc<MockAgentClient>,
    pub platform: Arc<MockPlatform>,
    pub registry: Arc<HandlerRegistry>,
    pub config: SwitchboardConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with default options.
    pub async fn new() -> Result<Self, SwitchboardError> {
        Self::builder().build().await
    }

    /// Create a user with a profile on the mock platform.
    pub async fn seed_user(
        &self,
        display_name: &str,
        platform_user_id: &str,
    ) -> Result<i64, SwitchboardError> {
        let user_id = self.store.create_user(display_name, None).await?;
        self.store
            .create_platform_profile(user_id, MOCK_PLATFORM, platform_user_id)
            .await?;
        Ok(user_id)
    }

    /// Create a user nobody can deliver to.
    pub async fn seed_user_without_profile(&self, display_name: &str) -> Result<i64, SwitchboardError> {
        self.store.create_user(display_name, None).await
    }

    /// Store a user message and enqueue it. Returns `(message_id, item_id)`.
    pub async fn ingest(&self, user_id: i64, text: &str) -> Result<(i64, ItemId), SwitchboardError> {
        self.store.ingest(user_id, text).await
    }

    pub async fn item(&self, id: ItemId) -> Result<QueueItem, SwitchboardError> {
        self.queue
            .get(id)
            .await?
            .ok_or_else(|| SwitchboardError::not_found("queue item", id))
    }

    /// Poll until the item reaches `status`, or fail after `timeout`.
    pub async fn wait_for_status(
        &self,
        id: ItemId,
        status: QueueStatus,
        timeout: Duration,
    ) -> Result<QueueItem, SwitchboardError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let item = self.item(id).await?;
            if item.status == status {
                return Ok(item);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SwitchboardError::Timeout { duration: timeout });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn response(&self, message_id: i64) -> Result<Option<String>, SwitchboardError> {
        self.store.get_response(message_id).await
    }

    /// Run raw SQL against the harness database, e.g. to install a trigger
    /// that makes a later statement fail.
    pub async fn execute_sql(&self, sql: &str) -> Result<(), SwitchboardError> {
        let sql = sql.to_string();
        self.queue
            .database()
            .connection()
            .call(move |conn| conn.execute_batch(&sql))
            .await
            .map_err(map_tr_err)
    }
}
