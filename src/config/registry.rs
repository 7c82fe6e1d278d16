//! Pair registry
//!
//! Turns configured pairs into validated, immutable records. A pair that fails
//! validation is excluded and reported; the remaining pairs are unaffected.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{GlobalSettings, SyncConfig, SyncPair};
use crate::error::{SyncError, SyncResult};
use crate::shared::glob::validate_patterns;

/// A pair excluded at load time, with the reason
#[derive(Debug, Clone)]
pub struct RejectedPair {
    pub name: String,
    pub error: SyncError,
}

/// Validated set of sync pairs
#[derive(Debug, Clone, Default)]
pub struct PairRegistry {
    pairs: Vec<Arc<SyncPair>>,
}

impl PairRegistry {
    /// Validate every configured pair. Names and local paths must be unique; the
    /// first occurrence wins and later duplicates are rejected.
    pub fn from_config(config: &SyncConfig) -> (Self, Vec<RejectedPair>) {
        let mut registry = Self::default();
        let mut rejected = Vec::new();

        for pair in &config.sync_pairs {
            let result = validate_pair(pair, &config.global).and_then(|p| registry.insert(p));
            if let Err(error) = result {
                tracing::warn!(pair = %pair.name, phase = "config", outcome = "rejected", error = %error);
                rejected.push(RejectedPair {
                    name: pair.name.clone(),
                    error,
                });
            }
        }

        (registry, rejected)
    }

    /// Add an already validated pair, enforcing uniqueness
    pub fn insert(&mut self, pair: SyncPair) -> SyncResult<()> {
        if self.get(&pair.name).is_some() {
            return Err(SyncError::config(&pair.name, "duplicate pair name"));
        }
        if let Some(other) = self
            .pairs
            .iter()
            .find(|p| paths_overlap(&p.local_path, &pair.local_path))
        {
            return Err(SyncError::config(
                &pair.name,
                format!(
                    "local path {} overlaps {} watched by pair '{}'",
                    pair.local_path.display(),
                    other.local_path.display(),
                    other.name
                ),
            ));
        }
        self.pairs.push(Arc::new(pair));
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Arc<SyncPair>> {
        let index = self.pairs.iter().position(|p| p.name == name)?;
        Some(self.pairs.remove(index))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SyncPair>> {
        self.pairs.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SyncPair>> {
        self.pairs.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.pairs.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Whether one tree contains the other (or they are the same tree)
pub fn paths_overlap(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Check one pair and normalize it: absolute canonical path, concrete interval.
///
/// A missing local folder is created.
pub fn validate_pair(pair: &SyncPair, global: &GlobalSettings) -> SyncResult<SyncPair> {
    let name = pair.name.trim();
    if name.is_empty() {
        return Err(SyncError::config("<unnamed>", "pair name cannot be empty"));
    }
    if pair.remote_ref.trim().is_empty() {
        return Err(SyncError::config(name, "remote_ref cannot be empty"));
    }
    if pair.branch.trim().is_empty() {
        return Err(SyncError::config(name, "branch cannot be empty"));
    }
    if pair.credential_ref.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(SyncError::config(name, "credential_ref cannot be empty"));
    }

    let interval = pair.autocommit_interval.unwrap_or(global.sync_interval);
    if interval == 0 {
        return Err(SyncError::config(name, "autocommit_interval must be greater than 0"));
    }

    validate_patterns(&pair.ignore_patterns)
        .map_err(|e| SyncError::config(name, format!("invalid ignore pattern: {e}")))?;

    let local_path = prepare_local_path(name, &pair.local_path)?;

    Ok(SyncPair {
        name: name.to_string(),
        local_path,
        autocommit_interval: Some(interval),
        ..pair.clone()
    })
}

fn prepare_local_path(name: &str, path: &Path) -> SyncResult<PathBuf> {
    let absolute = std::path::absolute(path)
        .map_err(|e| SyncError::config(name, format!("cannot resolve {}: {e}", path.display())))?;

    if !absolute.exists() {
        std::fs::create_dir_all(&absolute).map_err(|e| {
            SyncError::config(name, format!("cannot create {}: {e}", absolute.display()))
        })?;
    }

    let metadata = std::fs::metadata(&absolute)
        .map_err(|e| SyncError::config(name, format!("cannot read {}: {e}", absolute.display())))?;
    if !metadata.is_dir() {
        return Err(SyncError::config(
            name,
            format!("{} is not a directory", absolute.display()),
        ));
    }
    // Writable by the current user, not just by mode bits
    tempfile::Builder::new()
        .prefix(".mirrorsync-")
        .tempfile_in(&absolute)
        .map_err(|e| {
            SyncError::config(name, format!("{} is not writable: {e}", absolute.display()))
        })?;

    absolute
        .canonicalize()
        .map_err(|e| SyncError::config(name, format!("cannot resolve {}: {e}", absolute.display())))
}
