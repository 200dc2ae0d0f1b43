// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock platform plugin for deterministic testing.
//!
//! `MockPlatform` implements [`PlatformPlugin`] and captures every delivered
//! response for assertion in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use switchboard_core::{
    PlatformPlugin, PlatformProfileRef, ResponseHandler, SwitchboardError,
};
use switchboard_plugin::{PluginFactory, PluginManifest};

/// Platform name the mock registers under.
pub const MOCK_PLATFORM: &str = "mock";

/// A response captured by [`MockPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub text: String,
    pub platform_user_id: String,
    pub message_id: i64,
}

struct CapturingHandler {
    platform: String,
    delivered: Arc<Mutex<Vec<Delivery>>>,
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl ResponseHandler for CapturingHandler {
    async fn deliver(
        &self,
        response_text: &str,
        profile: &PlatformProfileRef,
        message_id: i64,
    ) -> Result<(), SwitchboardError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SwitchboardError::Delivery {
                platform: self.platform.clone(),
                message: "mock delivery failure".to_string(),
            });
        }
        self.delivered.lock().await.push(Delivery {
            text: response_text.to_string(),
            platform_user_id: profile.platform_user_id.clone(),
            message_id,
        });
        Ok(())
    }
}

/// A mock platform adapter.
pub struct MockPlatform {
    name: String,
    platform: String,
    settings: serde_json::Value,
    delivered: Arc<Mutex<Vec<Delivery>>>,
    fail_delivery: Arc<AtomicBool>,
    started: Arc<AtomicBool>,
}

impl MockPlatform {
    /// A plugin named `mock` for the `mock` platform.
    pub fn new() -> Self {
        Self::named(MOCK_PLATFORM, MOCK_PLATFORM)
    }

    pub fn named(name: &str, platform: &str) -> Self {
        Self {
            name: name.to_string(),
            platform: platform.to_string(),
            settings: serde_json::json!({}),
            delivered: Arc::default(),
            fail_delivery: Arc::default(),
            started: Arc::default(),
        }
    }

    /// A second instance sharing this one's deliveries and lifecycle flags,
    /// so tests can observe a plugin the registry built.
    pub fn sibling(&self) -> Self {
        Self {
            name: self.name.clone(),
            platform: self.platform.clone(),
            settings: self.settings.clone(),
            delivered: self.delivered.clone(),
            fail_delivery: self.fail_delivery.clone(),
            started: self.started.clone(),
        }
    }

    /// Make every subsequent delivery fail.
    pub fn fail_deliveries(&self, fail: bool) {
        self.fail_delivery.store(fail, Ordering::SeqCst);
    }

    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.delivered.lock().await.clone()
    }

    pub async fn delivery_count(&self) -> usize {
        self.delivered.lock().await.len()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformPlugin for MockPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> &str {
        &self.platform
    }

    fn message_handler(&self) -> Option<Arc<dyn ResponseHandler>> {
        Some(Arc::new(CapturingHandler {
            platform: self.platform.clone(),
            delivered: self.delivered.clone(),
            fail: self.fail_delivery.clone(),
        }))
    }

    fn get_settings(&self) -> serde_json::Value {
        self.settings.clone()
    }

    fn apply_settings(&mut self, settings: &serde_json::Value) -> Result<(), SwitchboardError> {
        if !settings.is_object() {
            return Err(SwitchboardError::Config(format!(
                "settings for `{}` must be a table",
                self.name
            )));
        }
        self.settings = settings.clone();
        Ok(())
    }

    async fn start(&self) -> Result<(), SwitchboardError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), SwitchboardError> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory handing out siblings of one [`MockPlatform`], so a plugin loaded
/// through discovery is observable from the test.
pub struct MockPlatformFactory {
    pub manifest: PluginManifest,
    template: Arc<MockPlatform>,
}

impl MockPlatformFactory {
    pub fn new(template: Arc<MockPlatform>) -> Self {
        Self {
            manifest: PluginManifest::new(
                template.name(),
                template.platform(),
                "mock platform for tests",
            ),
            template,
        }
    }
}

impl PluginFactory for MockPlatformFactory {
    fn manifest(&self) -> PluginManifest {
        self.manifest.clone()
    }

    fn create(&self) -> Result<Box<dyn PlatformPlugin>, SwitchboardError> {
        Ok(Box::new(self.template.sibling()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> PlatformProfileRef {
        PlatformProfileRef {
            profile_id: 1,
            platform_user_id: "mock-user".into(),
            platform: MOCK_PLATFORM.into(),
        }
    }

    #[tokio::test]
    async fn captures_deliveries() {
        let platform = MockPlatform::new();
        let handler = platform.message_handler().unwrap();
        handler.deliver("hello", &profile(), 3).await.unwrap();

        let delivered = platform.deliveries().await;
        assert_eq!(
            delivered,
            vec![Delivery {
                text: "hello".into(),
                platform_user_id: "mock-user".into(),
                message_id: 3,
            }]
        );
    }

    #[tokio::test]
    async fn failing_delivery() {
        let platform = MockPlatform::new();
        platform.fail_deliveries(true);
        let handler = platform.message_handler().unwrap();
        let err = handler.deliver("x", &profile(), 1).await.unwrap_err();
        assert!(matches!(err, SwitchboardError::Delivery { .. }));
        assert_eq!(platform.delivery_count().await, 0);
    }

    #[tokio::test]
    async fn lifecycle_flags() {
        let platform = MockPlatform::new();
        platform.start().await.unwrap();
        assert!(platform.is_started());
        platform.stop().await.unwrap();
        assert!(!platform.is_started());
    }

    #[tokio::test]
    async fn factory_plugins_share_state_with_the_template() {
        let template = Arc::new(MockPlatform::named("relay", "irc"));
        let factory = MockPlatformFactory::new(template.clone());
        assert_eq!(factory.manifest().platform, "irc");
        assert!(factory.manifest().missing_capabilities().is_empty());

        let built = factory.create().unwrap();
        built.start().await.unwrap();
        built
            .message_handler()
            .unwrap()
            .deliver("hi", &profile(), 5)
            .await
            .unwrap();

        assert!(template.is_started());
        assert_eq!(template.delivery_count().await, 1);
    }
}
