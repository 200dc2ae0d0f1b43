// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin factories and the sources that list them.
//!
//! Plugins are compiled in. The binary builds a [`StaticPluginSource`] from
//! the factories it links and hands it to
//! [`HandlerRegistry::discover`](crate::HandlerRegistry::discover).

use std::sync::Arc;

use switchboard_core::{PlatformPlugin, SwitchboardError};

use crate::manifest::PluginManifest;

/// Builds instances of one platform plugin.
pub trait PluginFactory: Send + Sync {
    /// Manifest checked before the plugin is instantiated.
    fn manifest(&self) -> PluginManifest;

    /// Create an instance with default settings. The registry applies the
    /// configured settings table afterwards.
    fn create(&self) -> Result<Box<dyn PlatformPlugin>, SwitchboardError>;
}

/// Enumerates discoverable plugins.
pub trait PluginSource: Send + Sync {
    fn factories(&self) -> Vec<Arc<dyn PluginFactory>>;
}

/// A fixed list of factories, in registration order.
#[derive(Default, Clone)]
pub struct StaticPluginSource {
    factories: Vec<Arc<dyn PluginFactory>>,
}

impl StaticPluginSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, factory: impl PluginFactory + 'static) -> Self {
        self.push(factory);
        self
    }

    pub fn push(&mut self, factory: impl PluginFactory + 'static) {
        self.factories.push(Arc::new(factory));
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Manifests of every listed factory, sorted by name.
    pub fn manifests(&self) -> Vec<PluginManifest> {
        let mut manifests: Vec<_> = self.factories.iter().map(|f| f.manifest()).collect();
        manifests.sort_by(|a, b| a.name.cmp(&b.name));
        manifests
    }
}

impl PluginSource for StaticPluginSource {
    fn factories(&self) -> Vec<Arc<dyn PluginFactory>> {
        self.factories.clone()
    }
}

impl std::fmt::Debug for StaticPluginSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticPluginSource")
            .field(
                "plugins",
                &self.factories.iter().map(|fac| fac.manifest().name).collect::<Vec<_>>(),
            )
            .finish()
    }
}
