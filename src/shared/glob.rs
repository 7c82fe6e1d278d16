//! Ignore pattern matching
//!
//! Compiles a pair's `ignore_patterns` into a single [`GlobSet`] used both when
//! staging changes and when filtering filesystem events.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Component, Path};

/// Directory names that are never staged or watched
const ALWAYS_IGNORED: &[&str] = &[".git"];

/// Compiled ignore rules for one sync pair
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    set: GlobSet,
}

impl IgnoreMatcher {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let processed = process_ignore_patterns(patterns);
        Ok(Self {
            set: build_globset(&processed)?,
        })
    }

    /// Matcher that only skips version-control metadata
    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
        }
    }

    /// Check a path relative to the pair's root.
    ///
    /// A path is ignored when it, or any directory above it, matches.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        let in_metadata = relative.components().any(|c| match c {
            Component::Normal(name) => ALWAYS_IGNORED.iter().any(|ig| name == *ig),
            _ => false,
        });
        if in_metadata {
            return true;
        }

        relative
            .ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .any(|p| self.set.is_match(p))
    }

    /// Check an absolute path under `root`; paths outside the root are ignored
    pub fn is_ignored_under(&self, root: &Path, path: &Path) -> bool {
        match path.strip_prefix(root) {
            Ok(rel) => self.is_ignored(rel),
            Err(_) => true,
        }
    }
}

/// Check that every pattern compiles, reporting the first bad one
pub fn validate_patterns(patterns: &[String]) -> Result<()> {
    for pattern in process_ignore_patterns(patterns) {
        Glob::new(&pattern)?;
    }
    Ok(())
}

/// Create a GlobSet from a list of patterns for efficient batch matching
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Normalize ignore-style patterns: drop blanks and comments, turn `dir/` into `dir`
/// (ancestor matching covers everything below it), strip a leading `/`.
fn process_ignore_patterns(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty() && !p.starts_with('#'))
        .map(|p| p.trim_start_matches('/').trim_end_matches('/').to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
