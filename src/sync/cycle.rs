//! The pull → commit → push cycle for one pair

use chrono::Local;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::{GlobalSettings, SyncPair};
use crate::error::SyncResult;
use crate::git::{CommitOutcome, PullOutcome, PushOutcome, RepoAdapter};

/// Bound on push-rejection races within a single cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(global: &GlobalSettings) -> Self {
        Self {
            max_retries: global.max_retries,
            retry_delay: global.retry_delay(),
        }
    }

    /// Total push attempts; a zero setting still allows one
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// How a completed cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing pulled, nothing committed, nothing to push
    NoOp,
    Synced {
        pulled: bool,
        commit: Option<String>,
        pushed: bool,
    },
    /// Stop requested before the next remote mutation
    Aborted,
}

impl CycleOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoOp => "no-op",
            Self::Synced { .. } => "synced",
            Self::Aborted => "aborted",
        }
    }
}

/// Run one full cycle against `adapter`.
///
/// A rejected push re-runs the pull and commit steps, up to
/// [`RetryPolicy::attempts`] pushes in total. `stop` is only consulted before a
/// pull; once a cycle has committed it carries on through the push.
pub async fn run_cycle(
    adapter: &dyn RepoAdapter,
    pair: &SyncPair,
    policy: RetryPolicy,
    mut stop: watch::Receiver<bool>,
) -> SyncResult<CycleOutcome> {
    let name = pair.name.as_str();

    adapter.ensure_initialized().await?;

    let mut pulled_any = false;
    let mut last_commit = None;
    let mut attempt = 0;

    loop {
        attempt += 1;
        if *stop.borrow() {
            tracing::info!(pair = %name, phase = "cycle", outcome = "aborted", attempt);
            return Ok(CycleOutcome::Aborted);
        }

        let pulled = adapter.pull_remote_priority().await?;
        tracing::info!(pair = %name, phase = "pull", outcome = pulled.label(), attempt);
        pulled_any |= pulled == PullOutcome::Updated;

        let message = pair.render_commit_message(Local::now());
        let committed = adapter.stage_and_commit(&message).await?;
        tracing::info!(pair = %name, phase = "commit", outcome = committed.label(), attempt);
        if let CommitOutcome::Committed(id) = committed {
            last_commit = Some(id);
        }

        if !pulled_any && last_commit.is_none() && adapter.status().await?.ahead == 0 {
            return Ok(CycleOutcome::NoOp);
        }

        match adapter.push().await {
            Ok(pushed) => {
                tracing::info!(pair = %name, phase = "push", outcome = pushed.label(), attempt);
                return Ok(CycleOutcome::Synced {
                    pulled: pulled_any,
                    commit: last_commit,
                    pushed: pushed == PushOutcome::Pushed,
                });
            }
            Err(e) if e.is_push_rejection() && attempt < policy.attempts() => {
                tracing::warn!(
                    pair = %name,
                    phase = "push",
                    outcome = "retry scheduled",
                    attempt,
                    max_attempts = policy.attempts(),
                    error = %e,
                );
                tokio::select! {
                    _ = tokio::time::sleep(policy.retry_delay) => {}
                    _ = stop.wait_for(|stopped| *stopped) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}
