//! Credential resolution
//!
//! Pairs only ever store the *name* of an environment variable. The secret is
//! looked up at the moment a git command needs it and is never logged or written
//! to disk.

use crate::error::{SyncError, SyncResult};
use std::fmt;

/// A resolved secret. `Debug` and `Display` never print the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Turns a `credential_ref` into a secret value
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> SyncResult<Secret>;
}

/// Resolves references against the process environment
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialResolver for EnvCredentials {
    fn resolve(&self, reference: &str) -> SyncResult<Secret> {
        let var = env_var_name(reference);
        match std::env::var(var) {
            Ok(value) if !value.is_empty() => Ok(Secret::new(value)),
            _ => Err(SyncError::CredentialMissing(var.to_string())),
        }
    }
}

/// Accept both `VAR` and the legacy `${VAR}` form
pub fn env_var_name(reference: &str) -> &str {
    let trimmed = reference.trim();
    trimmed
        .strip_prefix("${")
        .and_then(|s| s.strip_suffix('}'))
        .unwrap_or(trimmed)
}
