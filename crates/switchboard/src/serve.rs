// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `switchboard serve` implementation.
//!
//! Opens the database, discovers platform plugins, starts the queue processor,
//! then waits for SIGTERM/SIGINT and shuts everything down in reverse order.

use std::sync::Arc;

use switchboard_agent::{ProcessorConfig, QueueProcessor, install_signal_handler};
use switchboard_config::model::SwitchboardConfig;
use switchboard_core::{AgentClient, MessageStore, SwitchboardError};
use switchboard_plugin::HandlerRegistry;
use switchboard_storage::{QueueStore, SqliteMessageStore, retry_config};
use tracing::{error, info, warn};

use crate::agent_client::HttpAgentClient;
use crate::webhook::builtin_plugins;

/// Agent endpoint used when `agent.base_url` is unset. Only `live` mode calls it.
const DEFAULT_AGENT_URL: &str = "http://127.0.0.1:8700";

/// Runs the router until a shutdown signal arrives.
pub async fn run_serve(config: SwitchboardConfig) -> Result<(), SwitchboardError> {
    init_tracing(&config.agent.log_level);

    info!(
        agent = %config.agent.name,
        mode = %config.agent.mode,
        database = %config.storage.database_path,
        "starting switchboard serve"
    );

    let retry = retry_config(&config.retry);
    let queue = QueueStore::open(&config.storage, retry.clone()).await?;
    let store: Arc<dyn MessageStore> =
        Arc::new(SqliteMessageStore::new(queue.database().clone(), retry));

    let registry = Arc::new(initialize_plugin_registry(&config).await);
    let agent = build_agent_client(&config)?;

    let processor = QueueProcessor::new(
        queue.clone(),
        store,
        agent,
        config.agent.mode,
        Some(registry.clone()),
        ProcessorConfig::from(&config),
    );
    processor.start().await?;

    let shutdown = install_signal_handler();
    info!("switchboard ready");
    shutdown.cancelled().await;

    processor.stop().await;
    for e in registry.stop().await {
        warn!(error = %e, "plugin stop failed during shutdown");
    }
    if let Err(e) = queue.database().checkpoint().await {
        warn!(error = %e, "final WAL checkpoint failed");
    }

    info!("switchboard stopped");
    Ok(())
}

/// Discovers the built-in plugins and starts them. Failures are logged; the
/// router keeps running without the affected platforms.
async fn initialize_plugin_registry(config: &SwitchboardConfig) -> HandlerRegistry {
    let registry = HandlerRegistry::new();
    let report = registry.discover(&builtin_plugins(), &config.plugin);
    for (name, e) in &report.rejected {
        error!(plugin = %name, error = %e, "plugin not loaded");
    }
    for e in registry.start().await {
        error!(error = %e, "plugin failed to start");
    }
    registry
}

fn build_agent_client(config: &SwitchboardConfig) -> Result<Arc<dyn AgentClient>, SwitchboardError> {
    let base_url = config.agent.base_url.as_deref().unwrap_or(DEFAULT_AGENT_URL);
    let client = HttpAgentClient::new(base_url, config.agent.dispatch_timeout())?;
    info!(url = %client.base_url(), "agent client configured");
    Ok(Arc::new(client))
}

/// Initialize the tracing subscriber with the configured log level.
///
/// `RUST_LOG` takes precedence when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("switchboard={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_client_uses_configured_url() {
        let mut config = SwitchboardConfig::default();
        config.agent.base_url = Some("http://agent.local:9000".to_string());
        assert!(build_agent_client(&config).is_ok());
    }

    #[test]
    fn agent_client_falls_back_to_default_url() {
        let config = SwitchboardConfig::default();
        assert!(config.agent.base_url.is_none());
        assert!(build_agent_client(&config).is_ok());
    }

    #[tokio::test]
    async fn registry_without_webhook_url_keeps_plugin_loaded_but_failed() {
        let config = SwitchboardConfig::default();
        let registry = initialize_plugin_registry(&config).await;
        assert_eq!(registry.get_loaded_plugins(), vec!["webhook".to_string()]);
        assert_eq!(
            registry.plugin_status("webhook"),
            Some(switchboard_plugin::PluginStatus::Failed)
        );
    }
}
