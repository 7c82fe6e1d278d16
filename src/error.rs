//! Error taxonomy for sync operations
//!
//! Every failure a pair can hit during configuration, a sync cycle, or change
//! detection maps onto one of these variants. None of them escape the pair that
//! produced them.

use thiserror::Error;

/// Errors raised while configuring or driving a sync pair
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Bad or missing pair definition; the pair is excluded at startup
    #[error("invalid configuration for pair '{pair}': {reason}")]
    Config { pair: String, reason: String },

    /// The environment variable named by `credential_ref` is unset or empty
    #[error("credential missing: environment variable '{0}' is not set")]
    CredentialMissing(String),

    /// Repository could not be initialized or attached to its remote
    #[error("repository setup failed: {0}")]
    RepoSetup(String),

    /// Fetch or merge from the remote failed
    #[error("pull failed: {0}")]
    Pull(String),

    /// Staging or committing local changes failed
    #[error("commit failed: {0}")]
    Commit(String),

    /// Remote refused the push because it advanced since the last pull
    #[error("push rejected: {0}")]
    PushRejected(String),

    /// Push failed for any other reason (network, auth)
    #[error("push failed: {0}")]
    Push(String),

    /// The filesystem watch could not be established or died
    #[error("watch failed: {0}")]
    Watch(String),
}

impl SyncError {
    pub fn config(pair: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            pair: pair.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller should re-pull and try the push again
    pub fn is_push_rejection(&self) -> bool {
        matches!(self, Self::PushRejected(_))
    }

    /// Phase label used in structured log events
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::CredentialMissing(_) => "credentials",
            Self::RepoSetup(_) => "setup",
            Self::Pull(_) => "pull",
            Self::Commit(_) => "commit",
            Self::PushRejected(_) | Self::Push(_) => "push",
            Self::Watch(_) => "watch",
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
