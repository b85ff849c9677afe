//! Configuration Management
//!
//! Handles persistent configuration storage for skyctl.
//!
//! Settings are resolved in order: command-line flag, config file,
//! environment, built-in default.

use crate::output::OutputFormat;
use crate::resource::PollPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:4566";
pub const DEFAULT_REGION: &str = "ap-southeast-1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Polling overrides; unset fields keep the [`PollPolicy`] defaults
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PollConfig {
    #[serde(default)]
    pub initial_interval_ms: Option<u64>,
    #[serde(default)]
    pub max_interval_ms: Option<u64>,
    #[serde(default)]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Gateway endpoint, or `memory://` for the in-memory provider
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub output: Option<OutputFormat>,
    /// Default wait for create/delete commands
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub poll: PollConfig,
    /// Bulk request chunks in flight at once
    #[serde(default)]
    pub batch_concurrency: Option<usize>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("skyctl").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from `path`; a missing or unreadable file gives the defaults
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
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(())
    }

    /// Get effective endpoint (CLI > config > SKYCTL_ENDPOINT > default)
    pub fn effective_endpoint(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.endpoint.clone())
            .or_else(|| env_var("SKYCTL_ENDPOINT"))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    /// Get effective region (CLI > config > SKYCTL_REGION > AWS_REGION > default)
    pub fn effective_region(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.region.clone())
            .or_else(|| env_var("SKYCTL_REGION"))
            .or_else(|| env_var("AWS_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    pub fn effective_output(&self, cli: Option<OutputFormat>) -> OutputFormat {
        cli.or(self.output).unwrap_or_default()
    }

    pub fn effective_timeout(&self, cli_secs: Option<u64>) -> Duration {
        Duration::from_secs(cli_secs.or(self.timeout_secs).unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn poll_policy(&self) -> PollPolicy {
        let defaults = PollPolicy::default();
        PollPolicy {
            initial_interval: self
                .poll
                .initial_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_interval),
            max_interval: self
                .poll
                .max_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_interval),
            multiplier: self.poll.multiplier.unwrap_or(defaults.multiplier),
            max_attempts: self.poll.max_attempts.unwrap_or(defaults.max_attempts),
            max_polls: defaults.max_polls,
        }
    }

    pub fn batch_concurrency(&self) -> usize {
        self.batch_concurrency.unwrap_or(1).max(1)
    }
}
