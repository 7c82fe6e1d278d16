//! Scriptable in-memory adapter for scheduler tests

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::git::{CommitOutcome, PullOutcome, PushOutcome, RepoAdapter, RepoStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub initializations: u32,
    pub pulls: u32,
    pub commits: u32,
    pub pushes: u32,
}

#[derive(Default)]
struct Script {
    counts: Counts,
    dirty: bool,
    ahead: usize,
    remote_updates: u32,
    push_rejections: u32,
    pull_error: Option<SyncError>,
    push_error: Option<SyncError>,
    delay: Duration,
    last_message: Option<String>,
}

#[derive(Default)]
pub struct FakeRepo {
    script: Mutex<Script>,
}

impl FakeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        let mut script = self.script.lock().unwrap();
        f(&mut script)
    }

    pub fn counts(&self) -> Counts {
        self.with(|s| s.counts)
    }

    pub fn last_message(&self) -> Option<String> {
        self.with(|s| s.last_message.clone())
    }

    /// Next commit finds local changes
    pub fn mark_dirty(&self) {
        self.with(|s| s.dirty = true);
    }

    pub fn set_ahead(&self, ahead: usize) {
        self.with(|s| s.ahead = ahead);
    }

    /// Next `n` pulls bring in remote commits
    pub fn remote_advances(&self, n: u32) {
        self.with(|s| s.remote_updates = n);
    }

    /// Next `n` pushes are rejected as non-fast-forward
    pub fn reject_pushes(&self, n: u32) {
        self.with(|s| s.push_rejections = n);
    }

    /// Every pull fails with `error` until cleared
    pub fn fail_pulls(&self, error: Option<SyncError>) {
        self.with(|s| s.pull_error = error);
    }

    pub fn fail_pushes(&self, error: Option<SyncError>) {
        self.with(|s| s.push_error = error);
    }

    /// Simulated network latency of every pull
    pub fn set_delay(&self, delay: Duration) {
        self.with(|s| s.delay = delay);
    }
}

#[async_trait]
impl RepoAdapter for FakeRepo {
    async fn ensure_initialized(&self) -> SyncResult<()> {
        self.with(|s| s.counts.initializations += 1);
        Ok(())
    }

    async fn pull_remote_priority(&self) -> SyncResult<PullOutcome> {
        let delay = self.with(|s| s.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.with(|s| {
            s.counts.pulls += 1;
            if let Some(err) = &s.pull_error {
                return Err(err.clone());
            }
            if s.remote_updates > 0 {
                s.remote_updates -= 1;
                return Ok(PullOutcome::Updated);
            }
            Ok(PullOutcome::UpToDate)
        })
    }

    async fn stage_and_commit(&self, message: &str) -> SyncResult<CommitOutcome> {
        self.with(|s| {
            if !s.dirty {
                return Ok(CommitOutcome::NothingToCommit);
            }
            s.dirty = false;
            s.ahead += 1;
            s.counts.commits += 1;
            s.last_message = Some(message.to_string());
            Ok(CommitOutcome::Committed(format!("c{}", s.counts.commits)))
        })
    }

    async fn push(&self) -> SyncResult<PushOutcome> {
        self.with(|s| {
            s.counts.pushes += 1;
            if let Some(err) = &s.push_error {
                return Err(err.clone());
            }
            if s.push_rejections > 0 {
                s.push_rejections -= 1;
                return Err(SyncError::PushRejected("non-fast-forward".into()));
            }
            if s.ahead == 0 {
                return Ok(PushOutcome::UpToDate);
            }
            s.ahead = 0;
            Ok(PushOutcome::Pushed)
        })
    }

    async fn status(&self) -> SyncResult<RepoStatus> {
        Ok(self.with(|s| RepoStatus {
            initialized: s.counts.initializations > 0,
            branch: Some("main".to_string()),
            head: None,
            ahead: s.ahead,
            behind: 0,
            dirty_files: usize::from(s.dirty),
        }))
    }
}
