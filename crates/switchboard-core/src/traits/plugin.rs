// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base trait that every platform adapter plugin implements.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SwitchboardError;
use crate::traits::handler::ResponseHandler;

/// A chat platform adapter as seen by the handler registry.
///
/// Ingestion is the adapter's own business; the registry only needs identity,
/// settings, lifecycle, and the handler that delivers processed responses.
#[async_trait]
pub trait PlatformPlugin: Send + Sync + 'static {
    /// Human-readable, unique name of this plugin instance.
    fn name(&self) -> &str;

    /// Platform whose responses this plugin delivers (e.g. "telegram").
    fn platform(&self) -> &str;

    /// Handler used to deliver responses back to the platform.
    ///
    /// `None` means the plugin cannot deliver and is rejected at registration.
    fn message_handler(&self) -> Option<Arc<dyn ResponseHandler>>;

    /// Current settings as a JSON object.
    fn get_settings(&self) -> serde_json::Value;

    /// Applies settings from the plugin's configuration table.
    fn apply_settings(&mut self, settings: &serde_json::Value) -> Result<(), SwitchboardError>;

    /// Starts the adapter (connect, begin ingestion).
    async fn start(&self) -> Result<(), SwitchboardError>;

    /// Stops the adapter, releasing any held resources.
    async fn stop(&self) -> Result<(), SwitchboardError>;
}
