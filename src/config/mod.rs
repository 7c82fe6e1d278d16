//! Configuration management for mirrorsync
//!
//! This module holds the on-disk configuration model: global settings plus the
//! list of folder/repository pairs. Loading goes through figment (see [`core`]),
//! validation into runtime records happens in [`registry`].

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod core;
pub mod registry;

pub use registry::{PairRegistry, RejectedPair};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Main configuration document
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Settings shared by every pair
    pub global: GlobalSettings,

    /// Folder/repository bindings
    pub sync_pairs: Vec<SyncPair>,
}

/// Process-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlobalSettings {
    /// Seconds between timer-driven syncs for pairs without their own interval
    pub sync_interval: u64,

    /// Push attempts per cycle when the remote keeps advancing
    pub max_retries: u32,

    /// Seconds to wait before re-pulling after a rejected push
    pub retry_delay: u64,

    /// Seconds of filesystem quiet before a change burst becomes one signal
    pub debounce: u64,

    /// Enable filesystem change detection
    pub watch: bool,

    /// Default log filter (error, warn, info, debug, trace)
    pub log_level: String,

    /// Optional file receiving a plain copy of the log
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    /// Commit identity used when the repository has none configured
    pub author_name: String,
    pub author_email: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            sync_interval: 300,
            max_retries: 3,
            retry_delay: 5,
            debounce: 5,
            watch: true,
            log_level: "info".to_string(),
            log_file: None,
            author_name: "mirrorsync".to_string(),
            author_email: "mirrorsync@localhost".to_string(),
        }
    }
}

impl GlobalSettings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce)
    }
}

/// One folder to repository binding
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncPair {
    /// Unique identifier
    pub name: String,

    /// Folder being mirrored
    #[serde(alias = "local_folder")]
    pub local_path: PathBuf,

    /// Remote locator: `owner/repo`, a URL, or a filesystem path
    #[serde(alias = "github_repo")]
    pub remote_ref: String,

    /// Name of the environment variable holding the access token
    #[serde(default, alias = "github_token", skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<String>,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Seconds between forced sync attempts; falls back to `global.sync_interval`
    #[serde(default, alias = "autocommit_time", skip_serializing_if = "Option::is_none")]
    pub autocommit_interval: Option<u64>,

    #[serde(default = "default_commit_template")]
    pub commit_message_template: String,

    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_commit_template() -> String {
    "Sync: {timestamp}".to_string()
}

impl SyncPair {
    /// Minimal pair with defaults for everything optional
    pub fn new(
        name: impl Into<String>,
        local_path: impl Into<PathBuf>,
        remote_ref: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            local_path: local_path.into(),
            remote_ref: remote_ref.into(),
            credential_ref: None,
            branch: default_branch(),
            autocommit_interval: None,
            commit_message_template: default_commit_template(),
            ignore_patterns: Vec::new(),
        }
    }

    /// Effective timer period
    pub fn interval(&self, global: &GlobalSettings) -> Duration {
        Duration::from_secs(self.autocommit_interval.unwrap_or(global.sync_interval))
    }

    /// Substitute `{timestamp}` and `{pair}` in the commit template
    pub fn render_commit_message(&self, now: DateTime<Local>) -> String {
        self.commit_message_template
            .replace("{timestamp}", &now.format("%Y-%m-%d %H:%M:%S").to_string())
            .replace("{pair}", &self.name)
    }
}

impl SyncConfig {
    /// Read the configuration file as written, without defaults or env overrides.
    ///
    /// A missing file yields an empty document so `setup` can create it.
    pub fn read_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: SyncConfig = serde_yml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_yml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn pair(&self, name: &str) -> Option<&SyncPair> {
        self.sync_pairs.iter().find(|p| p.name == name)
    }

    /// Add a pair, replacing one with the same name only when `replace` is set
    pub fn upsert_pair(&mut self, pair: SyncPair, replace: bool) -> Result<()> {
        match self.sync_pairs.iter_mut().find(|p| p.name == pair.name) {
            Some(existing) if replace => *existing = pair,
            Some(_) => anyhow::bail!(
                "Sync pair '{}' already exists (use --force to replace it)",
                pair.name
            ),
            None => self.sync_pairs.push(pair),
        }
        Ok(())
    }

    /// Remove a pair by name, returning it if present
    pub fn remove_pair(&mut self, name: &str) -> Option<SyncPair> {
        let index = self.sync_pairs.iter().position(|p| p.name == name)?;
        Some(self.sync_pairs.remove(index))
    }
}
