//! Configuration Management
//!
//! Handles persistent configuration storage for workload-aggregate.

use crate::workload::DisconnectPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Namespace used when neither the payload nor the config names one
pub const DEFAULT_NAMESPACE: &str = "default";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Fixture file seeding the in-memory collections
    #[serde(default)]
    pub fixture: Option<PathBuf>,
    /// Aggregate watch behavior when one kind's stream ends
    #[serde(default, deserialize_with = "lenient_policy")]
    pub disconnect_policy: DisconnectPolicy,
    /// Namespace given to created workloads that lack `namespaceId`
    #[serde(default)]
    pub default_namespace: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("workload-aggregate").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from a specific file, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {:?}", path))?;

        Ok(())
    }

    /// Get effective fixture (CLI > config)
    pub fn effective_fixture(&self, cli: Option<PathBuf>) -> Option<PathBuf> {
        cli.or_else(|| self.fixture.clone())
    }

    /// Get effective namespace (CLI > config > "default")
    pub fn effective_namespace(&self, cli: Option<String>) -> String {
        cli.or_else(|| self.default_namespace.clone())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    /// Get effective watch policy (CLI > config)
    pub fn effective_policy(&self, cli: Option<DisconnectPolicy>) -> DisconnectPolicy {
        cli.unwrap_or(self.disconnect_policy)
    }

    /// Set fixture and save
    pub fn set_fixture(&mut self, fixture: &Path) -> Result<()> {
        self.fixture = Some(fixture.to_path_buf());
        self.save()
    }
}

/// Unknown policy names fall back to the default instead of discarding the
/// whole file
fn lenient_policy<'de, D>(deserializer: D) -> std::result::Result<DisconnectPolicy, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Ok(name.parse().unwrap_or_else(|e| {
        tracing::warn!("Ignoring disconnect_policy in config: {}", e);
        DisconnectPolicy::default()
    }))
}
