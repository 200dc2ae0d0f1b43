// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handler registry, plugin manifests, and the synchronous event bus.
//!
//! Platform plugins are compiled in and listed by a [`PluginSource`]. The
//! [`HandlerRegistry`] loads them, checks each response handler against the
//! delivery contract, and routes processed responses to the right platform.

pub mod catalog;
pub mod events;
pub mod manifest;
pub mod registry;

pub use catalog::{PluginFactory, PluginSource, StaticPluginSource};
pub use events::{EventBus, EventHandler, HandlerId};
pub use manifest::{PluginManifest, REQUIRED_CAPABILITIES, parse_plugin_manifest};
pub use registry::{DiscoveryReport, HandlerRegistry, PluginEntry, PluginStatus};
