// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! `./switchboard.toml` > `~/.config/switchboard/switchboard.toml` >
//! `/etc/switchboard/switchboard.toml`, with `SWITCHBOARD_*` environment
//! variables on top.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::SwitchboardConfig;

/// Top-level sections, used to split env var names into dotted keys.
const SECTIONS: &[&str] = &[
    "circuit_breaker",
    "agent",
    "queue",
    "storage",
    "retry",
    "plugin",
];

pub(crate) const SYSTEM_CONFIG: &str = "/etc/switchboard/switchboard.toml";
pub(crate) const LOCAL_CONFIG: &str = "switchboard.toml";

pub(crate) fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("switchboard/switchboard.toml"))
        .unwrap_or_default()
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/switchboard/switchboard.toml`
/// 3. `~/.config/switchboard/switchboard.toml`
/// 4. `./switchboard.toml`
/// 5. `SWITCHBOARD_*` environment variables
pub fn load_config() -> Result<SwitchboardConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<SwitchboardConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SwitchboardConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from one explicit file with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SwitchboardConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SwitchboardConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full Figment before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(SwitchboardConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// `SWITCHBOARD_QUEUE_MAX_ATTEMPTS` -> `queue.max_attempts`.
///
/// Splitting on every `_` would break keys like `max_attempts`, so only the
/// section prefix is turned into a dot.
fn env_provider() -> Env {
    Env::prefixed("SWITCHBOARD_")
        .map(|key| env_key_to_path(&key.as_str().to_ascii_lowercase()).into())
}

pub(crate) fn env_key_to_path(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
