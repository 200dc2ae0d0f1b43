// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform plugin manifests (`plugin.toml`).

use serde::{Deserialize, Serialize};
use switchboard_core::SwitchboardError;

/// Capabilities a plugin must declare to be loadable.
pub const REQUIRED_CAPABILITIES: [&str; 6] = [
    "name",
    "platform",
    "message_handler",
    "settings",
    "start",
    "stop",
];

/// Parsed manifest of a platform plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin name, also the key of its `[plugin.settings.<name>]` table.
    pub name: String,
    pub version: String,
    pub description: String,
    /// Platform whose responses the plugin delivers.
    pub platform: String,
    pub author: Option<String>,
    /// Declared plugin surface, checked against [`REQUIRED_CAPABILITIES`].
    pub capabilities: Vec<String>,
    pub min_switchboard_version: Option<String>,
    /// Settings keys the plugin reads.
    pub config_keys: Vec<String>,
}

impl PluginManifest {
    /// Manifest declaring the full required capability set.
    pub fn new(
        name: impl Into<String>,
        platform: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: description.into(),
            platform: platform.into(),
            author: None,
            capabilities: REQUIRED_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
            min_switchboard_version: None,
            config_keys: Vec::new(),
        }
    }

    /// Required capabilities this manifest does not declare.
    pub fn missing_capabilities(&self) -> Vec<&'static str> {
        REQUIRED_CAPABILITIES
            .iter()
            .copied()
            .filter(|req| !self.capabilities.iter().any(|c| c == req))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PluginManifestFile {
    plugin: PluginSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PluginSection {
    name: String,
    version: String,
    #[serde(default)]
    description: String,
    platform: String,
    author: Option<String>,
    #[serde(default)]
    capabilities: Vec<String>,
    min_switchboard_version: Option<String>,
    #[serde(default)]
    config_keys: Vec<String>,
}

/// Parse a plugin manifest from `plugin.toml` content.
///
/// `name` and `platform` must be non-empty and `version` (and
/// `min_switchboard_version`, if given) must be valid semver.
pub fn parse_plugin_manifest(toml_content: &str) -> Result<PluginManifest, SwitchboardError> {
    let file: PluginManifestFile = toml::from_str(toml_content)
        .map_err(|e| SwitchboardError::Config(format!("invalid plugin manifest: {e}")))?;
    let section = file.plugin;

    if section.name.trim().is_empty() {
        return Err(SwitchboardError::Config(
            "plugin manifest: name must not be empty".to_string(),
        ));
    }
    if section.platform.trim().is_empty() {
        return Err(SwitchboardError::Config(format!(
            "plugin manifest `{}`: platform must not be empty",
            section.name
        )));
    }
    semver::Version::parse(&section.version).map_err(|e| {
        SwitchboardError::Config(format!(
            "plugin manifest `{}`: invalid version `{}`: {e}",
            section.name, section.version
        ))
    })?;
    if let Some(min) = &section.min_switchboard_version {
        semver::Version::parse(min).map_err(|e| {
            SwitchboardError::Config(format!(
                "plugin manifest `{}`: invalid min_switchboard_version `{min}`: {e}",
                section.name
            ))
        })?;
    }

    Ok(PluginManifest {
        name: section.name,
        version: section.version,
        description: section.description,
        platform: section.platform,
        author: section.author,
        capabilities: section.capabilities,
        min_switchboard_version: section.min_switchboard_version,
        config_keys: section.config_keys,
    })
}
