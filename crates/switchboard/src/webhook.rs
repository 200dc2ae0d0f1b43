// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in `webhook` platform plugin.
//!
//! Delivers each processed response as a JSON `POST` to a configured URL:
//!
//! ```toml
//! [plugin.settings.webhook]
//! url = "https://bridge.example/deliver"
//! timeout_secs = 10
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use switchboard_core::{PlatformPlugin, PlatformProfileRef, ResponseHandler, SwitchboardError};
use switchboard_plugin::{PluginFactory, PluginManifest, StaticPluginSource, parse_plugin_manifest};
use tracing::{debug, info, warn};

pub const WEBHOOK_PLATFORM: &str = "webhook";

const WEBHOOK_MANIFEST: &str = include_str!("../plugins/webhook/plugin.toml");

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookSettings {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DeliveryPayload<'a> {
    platform_user_id: &'a str,
    profile_id: i64,
    message_id: i64,
    text: &'a str,
}

struct WebhookHandler {
    client: reqwest::Client,
    settings: WebhookSettings,
}

fn delivery_error(message: String) -> SwitchboardError {
    SwitchboardError::Delivery {
        platform: WEBHOOK_PLATFORM.to_string(),
        message,
    }
}

#[async_trait]
impl ResponseHandler for WebhookHandler {
    async fn deliver(
        &self,
        response_text: &str,
        profile: &PlatformProfileRef,
        message_id: i64,
    ) -> Result<(), SwitchboardError> {
        let Some(url) = &self.settings.url else {
            return Err(delivery_error("no webhook url configured".to_string()));
        };

        let response = self
            .client
            .post(url)
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .json(&DeliveryPayload {
                platform_user_id: &profile.platform_user_id,
                profile_id: profile.profile_id,
                message_id,
                text: response_text,
            })
            .send()
            .await
            .map_err(|e| delivery_error(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(delivery_error(format!("endpoint returned {status}")));
        }
        debug!(message_id, "webhook delivered");
        Ok(())
    }
}

/// Posts responses to an HTTP endpoint.
pub struct WebhookPlugin {
    client: reqwest::Client,
    settings: WebhookSettings,
}

impl WebhookPlugin {
    pub fn new() -> Result<Self, SwitchboardError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SwitchboardError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            settings: WebhookSettings::default(),
        })
    }

    pub fn settings(&self) -> &WebhookSettings {
        &self.settings
    }
}

#[async_trait]
impl PlatformPlugin for WebhookPlugin {
    fn name(&self) -> &str {
        WEBHOOK_PLATFORM
    }

    fn platform(&self) -> &str {
        WEBHOOK_PLATFORM
    }

    fn message_handler(&self) -> Option<Arc<dyn ResponseHandler>> {
        Some(Arc::new(WebhookHandler {
            client: self.client.clone(),
            settings: self.settings.clone(),
        }))
    }

    fn get_settings(&self) -> serde_json::Value {
        serde_json::to_value(&self.settings).unwrap_or_default()
    }

    fn apply_settings(&mut self, settings: &serde_json::Value) -> Result<(), SwitchboardError> {
        let parsed: WebhookSettings = serde_json::from_value(settings.clone())
            .map_err(|e| SwitchboardError::Config(format!("invalid webhook settings: {e}")))?;
        if parsed.timeout_secs == 0 {
            return Err(SwitchboardError::Config(
                "webhook timeout_secs must be greater than 0".to_string(),
            ));
        }
        if let Some(url) = &parsed.url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(SwitchboardError::Config(format!(
                "webhook url must start with http:// or https://, got `{url}`"
            )));
        }
        self.settings = parsed;
        Ok(())
    }

    async fn start(&self) -> Result<(), SwitchboardError> {
        match &self.settings().url {
            Some(url) => {
                info!(url = %url, "webhook plugin ready");
                Ok(())
            }
            None => Err(SwitchboardError::Config(
                "webhook url not configured; set plugin.settings.webhook.url".to_string(),
            )),
        }
    }

    async fn stop(&self) -> Result<(), SwitchboardError> {
        Ok(())
    }
}

pub struct WebhookFactory;

impl WebhookFactory {
    /// Parses `manifest_toml`. A broken manifest yields one with no
    /// capabilities, which discovery reports as incomplete.
    fn manifest_from(manifest_toml: &str) -> PluginManifest {
        parse_plugin_manifest(manifest_toml).unwrap_or_else(|e| {
            warn!(error = %e, "webhook plugin manifest is invalid");
            let mut manifest = PluginManifest::new(WEBHOOK_PLATFORM, WEBHOOK_PLATFORM, "");
            manifest.capabilities.clear();
            manifest
        })
    }
}

impl PluginFactory for WebhookFactory {
    fn manifest(&self) -> PluginManifest {
        Self::manifest_from(WEBHOOK_MANIFEST)
    }

    fn create(&self) -> Result<Box<dyn PlatformPlugin>, SwitchboardError> {
        Ok(Box::new(WebhookPlugin::new()?))
    }
}

/// Plugins compiled into the binary.
pub fn builtin_plugins() -> StaticPluginSource {
    StaticPluginSource::new().with(WebhookFactory)
}
