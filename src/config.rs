//! Engine configuration: oracle endpoints, models and timeouts.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub schema_version: u32,
    /// Base URL of the narrative oracle; reports cannot be generated without it.
    pub narrative_base_url: Option<String>,
    pub narrative_model: String,
    pub narrative_api_key: Option<String>,
    /// Base URL of the comparison oracle; trends fall back to a local
    /// estimate when unset.
    pub comparison_base_url: Option<String>,
    pub comparison_model: String,
    pub comparison_api_key: Option<String>,
    /// Per-request timeout for both oracles, in seconds. A timeout is
    /// treated the same as an unavailable oracle.
    pub oracle_timeout_secs: u64,
    /// Default rollup span for the improvement tracker.
    pub tracker_weeks: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            narrative_base_url: None,
            narrative_model: "gpt-4o".to_string(),
            narrative_api_key: None,
            comparison_base_url: None,
            comparison_model: "gpt-4o".to_string(),
            comparison_api_key: None,
            oracle_timeout_secs: 30,
            tracker_weeks: 12,
        }
    }
}

impl EngineConfig {
    /// Get the default config directory
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".progress-engine"))
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }

    /// Load config from the default path or return defaults
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                debug!("Failed to load config, using default: {}", e);
                Self::default()
            }
        }
    }

    /// Load config from the default path
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: EngineConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
