//! Configuration loading and merge logic for `install-guard`.
//!
//! Global config and project-local config are merged with project values taking precedence.

mod overlay;

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use self::overlay::ConfigOverlay;

/// Default cache TTL in minutes.
pub const DEFAULT_CACHE_TTL_MINUTES: u64 = 60;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InstallGuardConfig {
    /// Provider response cache settings.
    pub cache: CacheConfig,
    /// Extra known-deprecated packages, name to deprecation message.
    pub deprecated: BTreeMap<String, String>,
}

/// Cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Cache entry TTL in minutes.
    pub ttl_minutes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_minutes: DEFAULT_CACHE_TTL_MINUTES,
        }
    }
}

impl InstallGuardConfig {
    /// Loads and merges global + project configuration from default paths.
    ///
    /// # Errors
    ///
    /// Returns an error if any discovered config file cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with_paths(global_config_path(), project_config_path())
    }

    fn load_with_paths(global: Option<PathBuf>, project: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        for path in [global, project].into_iter().flatten() {
            config.merge_from_path(&path)?;
        }
        Ok(config)
    }

    fn merge_from_path(&mut self, path: &Path) -> anyhow::Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        let overlay: ConfigOverlay = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file at {}", path.display()))?;
        tracing::debug!(path = %path.display(), "applied config file");
        self.apply_overlay(overlay);
        Ok(())
    }

    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        if let Some(cache) = overlay.cache {
            if let Some(enabled) = cache.enabled {
                self.cache.enabled = enabled;
            }
            if let Some(ttl_minutes) = cache.ttl_minutes {
                self.cache.ttl_minutes =
                    sanitize_positive_u64(ttl_minutes, DEFAULT_CACHE_TTL_MINUTES);
            }
        }
        for (name, message) in overlay.deprecated {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            self.deprecated.insert(name.to_string(), message);
        }
    }
}

fn global_config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os("INSTALL_GUARD_CONFIG_GLOBAL_PATH") {
        return Some(PathBuf::from(explicit));
    }

    let home = env::var_os("HOME")
        .or_else(|| env::var_os("USERPROFILE"))
        .map(PathBuf::from)?;

    Some(home.join(".config").join("install-guard").join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os("INSTALL_GUARD_CONFIG_PROJECT_PATH") {
        return Some(PathBuf::from(explicit));
    }

    let cwd = env::current_dir().ok()?;
    Some(cwd.join(".install-guard.toml"))
}

fn sanitize_positive_u64(value: u64, fallback: u64) -> u64 {
    if value == 0 { fallback } else { value }
}

#[cfg(test)]
#[path = "../tests/config.rs"]
mod tests;
