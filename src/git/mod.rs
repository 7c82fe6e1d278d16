//! Repository adapter
//!
//! The sync cycle only talks to a pair's repository through [`RepoAdapter`].
//! [`GitRepo`] is the real implementation: git2 for local index and status work,
//! the system `git` binary for anything that talks to the remote.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::SyncResult;

pub mod operations;
pub mod remote;

pub use operations::GitRepo;

/// Result of pulling from the tracked branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Remote commits were merged (or the remote replaced local state)
    Updated,
    /// Nothing new on the remote
    UpToDate,
}

/// Result of staging and committing local changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(String),
    NothingToCommit,
}

/// Result of pushing the local branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    UpToDate,
}

impl PullOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::UpToDate => "up-to-date",
        }
    }
}

impl CommitOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Committed(_) => "committed",
            Self::NothingToCommit => "nothing-to-commit",
        }
    }
}

impl PushOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pushed => "pushed",
            Self::UpToDate => "up-to-date",
        }
    }
}

/// Read-only snapshot of a working copy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepoStatus {
    pub initialized: bool,
    pub branch: Option<String>,
    pub head: Option<String>,
    pub ahead: usize,
    pub behind: usize,
    pub dirty_files: usize,
}

/// Version-control operations needed to drive one pair through a cycle.
///
/// Every operation must be safe to retry.
#[async_trait]
pub trait RepoAdapter: Send + Sync {
    /// Initialize the working copy and attach the remote if needed
    async fn ensure_initialized(&self) -> SyncResult<()>;

    /// Fetch and merge the tracked branch; on conflicting hunks the remote wins
    async fn pull_remote_priority(&self) -> SyncResult<PullOutcome>;

    /// Stage everything not ignored and commit it with `message`
    async fn stage_and_commit(&self, message: &str) -> SyncResult<CommitOutcome>;

    /// Push the local branch to the remote
    async fn push(&self) -> SyncResult<PushOutcome>;

    /// Lightweight status without mutating anything
    async fn status(&self) -> SyncResult<RepoStatus>;
}
