// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a misspelled key fails
//! at startup instead of silently falling back to a default.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_core::ProcessingMode;

/// Top-level Switchboard configuration.
///
/// Every section is optional and defaults to values suitable for a local run.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchboardConfig {
    /// Downstream agent and process identity.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Queue processor tuning.
    #[serde(default)]
    pub queue: QueueConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Retry policy for storage operations and agent calls.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Circuit breaker guarding the agent.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    /// Platform plugin enablement and per-plugin settings.
    #[serde(default)]
    pub plugin: PluginConfig,
}

/// Downstream agent configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Name used in logs and as the circuit breaker name.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Initial processing mode.
    #[serde(default)]
    pub mode: ProcessingMode,

    /// Base URL of the agent service. Required in `live` mode.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Deadline for a whole live agent call, retries and backoff included.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
            mode: ProcessingMode::default(),
            base_url: None,
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
        }
    }
}

impl AgentConfig {
    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

fn default_agent_name() -> String {
    "switchboard".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_dispatch_timeout_secs() -> u64 {
    120
}

/// Queue processor configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Sleep between polls when the queue is empty.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Processing attempts before an item is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Items processed concurrently.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Base of the delay slept before an item is requeued.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Cap on the requeue delay.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// How long `stop` waits for in-flight items before force-cancelling them.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// How long force-cancelled items get to detach and release.
    #[serde(default = "default_detach_grace_secs")]
    pub detach_grace_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            concurrency_limit: default_concurrency_limit(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            detach_grace_secs: default_detach_grace_secs(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn detach_grace(&self) -> Duration {
        Duration::from_secs(self.detach_grace_secs)
    }
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_concurrency_limit() -> usize {
    1
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_detach_grace_secs() -> u64 {
    5
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL journaling.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("switchboard").join("switchboard.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("switchboard.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Retry policy in config form; the resilience crate owns the runtime type.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the circuit stays open before admitting a probe.
    #[serde(default = "default_breaker_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            timeout_secs: default_breaker_timeout_secs(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_breaker_timeout_secs() -> u64 {
    60
}

/// Plugin enablement and settings.
///
/// ```toml
/// [plugin.enabled]
/// webhook = true
///
/// [plugin.settings.webhook]
/// url = "https://chat.example.com/hooks/switchboard"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    /// Per-plugin enable flag. Plugins not listed are enabled.
    #[serde(default)]
    pub enabled: BTreeMap<String, bool>,

    /// Per-plugin settings table, handed to the plugin factory as JSON.
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

impl PluginConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.get(name).copied().unwrap_or(true)
    }

    /// Settings for `name`, or an empty object.
    pub fn settings_for(&self, name: &str) -> serde_json::Value {
        self.settings
            .get(name)
            .cloned()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()))
    }
}
