use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use std::path::Path;

use super::SyncConfig;

/// Prefix for environment overrides, e.g. `MIRRORSYNC_GLOBAL__MAX_RETRIES=5`
pub const ENV_PREFIX: &str = "MIRRORSYNC_";

impl SyncConfig {
    /// Load the layered configuration: defaults, then the YAML file, then environment.
    ///
    /// Unlike [`SyncConfig::read_file`] the file must exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file {} not found", path.display());
        }

        Self::figment(path)
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(SyncConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__").ignore(&["config"]))
    }
}
