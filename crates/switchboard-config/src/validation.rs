// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use switchboard_core::ProcessingMode;

use crate::diagnostic::ConfigError;
use crate::model::SwitchboardConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every problem instead of stopping at the first one.
pub fn validate_config(config: &SwitchboardConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.agent.log_level.to_ascii_lowercase().as_str()) {
        fail(format!(
            "agent.log_level `{}` is not one of {}",
            config.agent.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.agent.dispatch_timeout_secs == 0 {
        fail("agent.dispatch_timeout_secs must be greater than 0".to_string());
    }

    match config.agent.base_url.as_deref().map(str::trim) {
        None | Some("") if config.agent.mode == ProcessingMode::Live => {
            fail("agent.base_url is required when agent.mode is `live`".to_string());
        }
        Some(url)
            if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) =>
        {
            fail(format!("agent.base_url `{url}` must start with http:// or https://"));
        }
        _ => {}
    }

    let queue = &config.queue;
    if queue.poll_interval_ms == 0 {
        fail("queue.poll_interval_ms must be greater than 0".to_string());
    }
    if queue.max_attempts == 0 {
        fail("queue.max_attempts must be at least 1".to_string());
    }
    if queue.concurrency_limit == 0 {
        fail("queue.concurrency_limit must be at least 1".to_string());
    }
    if queue.backoff_base_ms > queue.backoff_max_ms {
        fail(format!(
            "queue.backoff_base_ms ({}) must not exceed queue.backoff_max_ms ({})",
            queue.backoff_base_ms, queue.backoff_max_ms
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        fail(format!(
            "retry.base_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
            config.retry.base_delay_ms, config.retry.max_delay_ms
        ));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        fail("circuit_breaker.failure_threshold must be at least 1".to_string());
    }

    for (name, settings) in &config.plugin.settings {
        if !settings.is_object() {
            fail(format!("plugin.settings.{name} must be a table"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
