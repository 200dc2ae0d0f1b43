// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handler registry: loaded platform plugins and their response handlers.
//!
//! The registry owns every loaded [`PlatformPlugin`], maps each platform to
//! the [`ResponseHandler`] that delivers its responses, drives plugin
//! lifecycle, and carries the synchronous [`EventBus`].
//!
//! Locks are never held across an `.await`: lifecycle calls work on a
//! snapshot of the plugin list.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use switchboard_config::model::PluginConfig;
use switchboard_core::{
    HandlerContract, PlatformPlugin, PluginEvent, ResponseHandler, SwitchboardError,
};
use tracing::{debug, error, info, warn};

use crate::catalog::PluginSource;
use crate::events::{EventBus, EventHandler, HandlerId};
use crate::manifest::PluginManifest;

/// Lifecycle status of a loaded plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    /// Registered, not started yet.
    Loaded,
    Running,
    Stopped,
    /// `start()` returned an error.
    Failed,
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginStatus::Loaded => write!(f, "loaded"),
            PluginStatus::Running => write!(f, "running"),
            PluginStatus::Stopped => write!(f, "stopped"),
            PluginStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A loaded plugin.
pub struct PluginEntry {
    pub plugin: Arc<dyn PlatformPlugin>,
    /// `None` for plugins registered directly rather than discovered.
    pub manifest: Option<PluginManifest>,
    pub status: PluginStatus,
}

impl std::fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEntry")
            .field("name", &self.plugin.name())
            .field("platform", &self.plugin.platform())
            .field("status", &self.status)
            .finish()
    }
}

/// Outcome of [`HandlerRegistry::discover`].
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Names of plugins now registered.
    pub loaded: Vec<String>,
    /// Skipped because `plugin.enabled.<name> = false`.
    pub disabled: Vec<String>,
    /// Skipped because the manifest lacks required capabilities.
    pub incomplete: Vec<(String, Vec<&'static str>)>,
    /// Instantiated but refused: settings, uniqueness or handler contract.
    pub rejected: Vec<(String, SwitchboardError)>,
}

/// Routes processed responses to their platform and manages plugin lifecycle.
#[derive(Default)]
pub struct HandlerRegistry {
    plugins: RwLock<HashMap<String, PluginEntry>>,
    handlers: RwLock<HashMap<String, Arc<dyn ResponseHandler>>>,
    events: EventBus,
    running: AtomicBool,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every enabled, complete plugin the source lists.
    ///
    /// One bad plugin never prevents the others from loading.
    pub fn discover(&self, source: &dyn PluginSource, config: &PluginConfig) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        for factory in source.factories() {
            let manifest = factory.manifest();
            let name = manifest.name.clone();

            let missing = manifest.missing_capabilities();
            if !missing.is_empty() {
                warn!(plugin = %name, missing = ?missing, "plugin manifest incomplete, skipping");
                report.incomplete.push((name, missing));
                continue;
            }
            if !config.is_enabled(&name) {
                info!(plugin = %name, "plugin disabled by configuration");
                report.disabled.push(name);
                continue;
            }

            let built = factory.create().and_then(|mut plugin| {
                plugin.apply_settings(&config.settings_for(&name))?;
                Ok(plugin)
            });
            let result = built.and_then(|plugin| self.insert(Arc::from(plugin), Some(manifest)));
            match result {
                Ok(loaded) => report.loaded.push(loaded),
                Err(e) => {
                    error!(plugin = %name, error = %e, "plugin rejected");
                    report.rejected.push((name, e));
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            disabled = report.disabled.len(),
            incomplete = report.incomplete.len(),
            rejected = report.rejected.len(),
            "plugin discovery finished"
        );
        report
    }

    /// Register an already-built plugin, applying the same checks as discovery.
    pub fn register(&self, plugin: Arc<dyn PlatformPlugin>) -> Result<(), SwitchboardError> {
        self.insert(plugin, None).map(|_| ())
    }

    fn insert(
        &self,
        plugin: Arc<dyn PlatformPlugin>,
        manifest: Option<PluginManifest>,
    ) -> Result<String, SwitchboardError> {
        let name = plugin.name().to_string();
        let platform = plugin.platform().to_string();

        if name.is_empty() || platform.is_empty() {
            return Err(SwitchboardError::HandlerContract {
                plugin: name,
                reason: "plugin name and platform must not be empty".to_string(),
            });
        }

        let handler = plugin
            .message_handler()
            .ok_or_else(|| SwitchboardError::HandlerContract {
                plugin: name.clone(),
                reason: "plugin provides no response handler".to_string(),
            })?;
        if let Some(reason) = handler.contract().mismatch(&HandlerContract::delivery()) {
            return Err(SwitchboardError::HandlerContract {
                plugin: name,
                reason,
            });
        }

        let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if plugins.contains_key(&name) {
            return Err(SwitchboardError::HandlerContract {
                plugin: name,
                reason: "a plugin with this name is already registered".to_string(),
            });
        }
        if handlers.contains_key(&platform) {
            return Err(SwitchboardError::HandlerContract {
                plugin: name,
                reason: format!("platform `{platform}` already has a response handler"),
            });
        }

        handlers.insert(platform.clone(), handler);
        plugins.insert(
            name.clone(),
            PluginEntry {
                plugin,
                manifest,
                status: PluginStatus::Loaded,
            },
        );
        debug!(plugin = %name, platform = %platform, "plugin registered");
        Ok(name)
    }

    /// Start every plugin. Returns the failures; the rest keep running.
    pub async fn start(&self) -> Vec<SwitchboardError> {
        let mut failures = Vec::new();
        for (name, plugin) in self.snapshot() {
            match plugin.start().await {
                Ok(()) => {
                    self.set_status(&name, PluginStatus::Running);
                    info!(plugin = %name, "plugin started");
                }
                Err(e) => {
                    self.set_status(&name, PluginStatus::Failed);
                    let err = SwitchboardError::PluginLifecycle {
                        plugin: name.clone(),
                        source: Box::new(e),
                    };
                    error!(plugin = %name, error = %err, "plugin failed to start");
                    failures.push(err);
                }
            }
        }
        self.running.store(true, Ordering::SeqCst);
        failures
    }

    /// Stop every plugin. Returns the failures; every plugin is still asked to stop.
    pub async fn stop(&self) -> Vec<SwitchboardError> {
        let mut failures = Vec::new();
        for (name, plugin) in self.snapshot() {
            if let Err(e) = plugin.stop().await {
                let err = SwitchboardError::PluginLifecycle {
                    plugin: name.clone(),
                    source: Box::new(e),
                };
                warn!(plugin = %name, error = %err, "plugin failed to stop");
                failures.push(err);
            } else {
                debug!(plugin = %name, "plugin stopped");
            }
            self.set_status(&name, PluginStatus::Stopped);
        }
        self.running.store(false, Ordering::SeqCst);
        failures
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn register_event_handler(&self, event_type: &str, handler: EventHandler) -> HandlerId {
        self.events.register(event_type, handler)
    }

    pub fn unregister_event_handler(&self, event_type: &str, id: HandlerId) -> bool {
        self.events.unregister(event_type, id)
    }

    /// Synchronously deliver an event. Returns the number of handlers that succeeded.
    pub fn emit_event(&self, event: &PluginEvent) -> usize {
        self.events.emit(event)
    }

    /// Response handler registered for `platform`.
    pub fn get_platform_handler(&self, platform: &str) -> Option<Arc<dyn ResponseHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(platform)
            .cloned()
    }

    /// Names of all loaded plugins, sorted.
    pub fn get_loaded_plugins(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn PlatformPlugin>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|e| e.plugin.clone())
    }

    pub fn plugin_status(&self, name: &str) -> Option<PluginStatus> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|e| e.status)
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn PlatformPlugin>)> {
        let mut list: Vec<_> = self
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, e)| (name.clone(), e.plugin.clone()))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }

    fn set_status(&self, name: &str, status: PluginStatus) {
        if let Some(entry) = self
            .plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(name)
        {
            entry.status = status;
        }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("plugins", &self.get_loaded_plugins())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use switchboard_core::{PlatformProfileRef, handler_fn};

    use super::*;
    use crate::catalog::{PluginFactory, StaticPluginSource};

    struct BadContract;

    #[async_trait]
    impl ResponseHandler for BadContract {
        fn contract(&self) -> HandlerContract {
            HandlerContract {
                asynchronous: false,
                parameters: vec!["response_text".into()],
            }
        }

        async fn deliver(
            &self,
            _response_text: &str,
            _profile: &PlatformProfileRef,
            _message_id: i64,
        ) -> Result<(), SwitchboardError> {
            Ok(())
        }
    }

    struct TestPlugin {
        name: String,
        platform: String,
        handler: Option<Arc<dyn ResponseHandler>>,
        settings: serde_json::Value,
        fail_start: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl TestPlugin {
        fn new(name: &str, platform: &str) -> Self {
            Self {
                name: name.into(),
                platform: platform.into(),
                handler: Some(Arc::new(handler_fn(|_, _, _| async { Ok(()) }))),
                settings: serde_json::json!({}),
                fail_start: false,
                log: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl PlatformPlugin for TestPlugin {
        fn name(&self) -> &str {
            &self.name
        }
        fn platform(&self) -> &str {
            &self.platform
        }
        fn message_handler(&self) -> Option<Arc<dyn ResponseHandler>> {
            self.handler.clone()
        }
        fn get_settings(&self) -> serde_json::Value {
            self.settings.clone()
        }
        fn apply_settings(&mut self, settings: &serde_json::Value) -> Result<(), SwitchboardError> {
            self.settings = settings.clone();
            Ok(())
        }
        async fn start(&self) -> Result<(), SwitchboardError> {
            self.log.lock().unwrap().push(format!("start:{}", self.name));
            if self.fail_start {
                return Err(SwitchboardError::Internal("cannot connect".into()));
            }
            Ok(())
        }
        async fn stop(&self) -> Result<(), SwitchboardError> {
            self.log.lock().unwrap().push(format!("stop:{}", self.name));
            Ok(())
        }
    }

    struct TestFactory {
        manifest: PluginManifest,
        bad_contract: bool,
    }

    impl PluginFactory for TestFactory {
        fn manifest(&self) -> PluginManifest {
            self.manifest.clone()
        }
        fn create(&self) -> Result<Box<dyn PlatformPlugin>, SwitchboardError> {
            let mut plugin = TestPlugin::new(&self.manifest.name, &self.manifest.platform);
            if self.bad_contract {
                plugin.handler = Some(Arc::new(BadContract));
            }
            Ok(Box::new(plugin))
        }
    }

    fn factory(name: &str, platform: &str) -> TestFactory {
        TestFactory {
            manifest: PluginManifest::new(name, platform, "test"),
            bad_contract: false,
        }
    }

    #[test]
    fn discover_loads_complete_enabled_plugins() {
        let mut incomplete = factory("partial", "irc");
        incomplete.manifest.capabilities.retain(|c| c != "stop");
        let mut bad = factory("legacy", "sms");
        bad.bad_contract = true;

        let source = StaticPluginSource::new()
            .with(factory("webhook", "webhook"))
            .with(factory("chat", "chat"))
            .with(factory("muted", "muted"))
            .with(incomplete)
            .with(bad);

        let mut config = PluginConfig::default();
        config.enabled.insert("muted".into(), false);
        config
            .settings
            .insert("webhook".into(), serde_json::json!({"url": "http://hook"}));

        let registry = HandlerRegistry::new();
        let report = registry.discover(&source, &config);

        assert_eq!(report.loaded, vec!["webhook", "chat"]);
        assert_eq!(report.disabled, vec!["muted"]);
        assert_eq!(report.incomplete, vec![("partial".to_string(), vec!["stop"])]);
        assert_eq!(report.rejected.len(), 1);
        assert!(matches!(
            report.rejected[0].1,
            SwitchboardError::HandlerContract { .. }
        ));

        assert_eq!(registry.get_loaded_plugins(), vec!["chat", "webhook"]);
        assert!(registry.get_platform_handler("sms").is_none());
        let webhook = registry.get_plugin("webhook").unwrap();
        assert_eq!(webhook.get_settings()["url"], "http://hook");
    }

    #[test]
    fn register_rejects_contract_mismatch() {
        let registry = HandlerRegistry::new();
        let mut plugin = TestPlugin::new("legacy", "sms");
        plugin.handler = Some(Arc::new(BadContract));

        let err = registry.register(Arc::new(plugin)).unwrap_err();
        assert!(matches!(err, SwitchboardError::HandlerContract { ref plugin, .. } if plugin == "legacy"));
        assert!(registry.get_loaded_plugins().is_empty());
    }

    #[test]
    fn register_rejects_missing_handler() {
        let registry = HandlerRegistry::new();
        let mut plugin = TestPlugin::new("mute", "mute");
        plugin.handler = None;
        assert!(registry.register(Arc::new(plugin)).is_err());
    }

    #[test]
    fn register_rejects_duplicates() {
        let registry = HandlerRegistry::new();
        registry.register(Arc::new(TestPlugin::new("a", "chat"))).unwrap();

        let same_name = registry.register(Arc::new(TestPlugin::new("a", "other")));
        assert!(same_name.is_err());
        let same_platform = registry.register(Arc::new(TestPlugin::new("b", "chat")));
        assert!(same_platform.unwrap_err().to_string().contains("already has a response handler"));

        assert_eq!(registry.get_loaded_plugins(), vec!["a"]);
        assert!(registry.get_platform_handler("other").is_none());
    }

    #[tokio::test]
    async fn lifecycle_failures_are_isolated() {
        let registry = HandlerRegistry::new();
        let log: Arc<Mutex<Vec<String>>> = Arc::default();

        let mut broken = TestPlugin::new("broken", "b");
        broken.fail_start = true;
        broken.log = log.clone();
        let mut healthy = TestPlugin::new("healthy", "h");
        healthy.log = log.clone();
        registry.register(Arc::new(broken)).unwrap();
        registry.register(Arc::new(healthy)).unwrap();

        assert!(!registry.is_running());
        let failures = registry.start().await;
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], SwitchboardError::PluginLifecycle { ref plugin, .. } if plugin == "broken"));
        assert!(registry.is_running());
        assert_eq!(registry.plugin_status("broken"), Some(PluginStatus::Failed));
        assert_eq!(registry.plugin_status("healthy"), Some(PluginStatus::Running));

        assert!(registry.stop().await.is_empty());
        assert!(!registry.is_running());
        assert_eq!(registry.plugin_status("healthy"), Some(PluginStatus::Stopped));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start:broken", "start:healthy", "stop:broken", "stop:healthy"]
        );
    }

    #[test]
    fn events_go_through_the_registry_bus() {
        let registry = HandlerRegistry::new();
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        let id = registry.register_event_handler(
            "item_completed",
            Arc::new(move |_: &PluginEvent| {
                *counter.lock().unwrap() += 1;
                Ok(())
            }),
        );

        let event = PluginEvent::new("item_completed", serde_json::json!({"item_id": 4}));
        assert_eq!(registry.emit_event(&event), 1);
        assert!(registry.unregister_event_handler("item_completed", id));
        assert_eq!(registry.emit_event(&event), 0);
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
