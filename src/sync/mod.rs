//! Sync engine
//!
//! One [`scheduler::Scheduler`] per pair drives [`cycle::run_cycle`] from timer
//! ticks and change signals. The [`orchestrator::Orchestrator`] owns all of them.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;

pub mod cycle;
pub mod orchestrator;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use cycle::{CycleOutcome, RetryPolicy, run_cycle};
pub use orchestrator::{Orchestrator, PairSnapshot};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerSettings};

/// Lifecycle of a pair's scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
    Disabled,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Error => "error",
            Self::Disabled => "disabled",
        };
        f.write_str(label)
    }
}

/// In-memory state of one pair. Never persisted; a restart begins idle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncState {
    pub status: SyncStatus,
    pub last_sync_time: Option<DateTime<Local>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub pending_trigger: bool,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            last_sync_time: None,
            last_error: None,
            consecutive_failures: 0,
            pending_trigger: false,
        }
    }
}

impl SyncState {
    /// State for a pair that never started
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Disabled,
            last_error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Why a cycle was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerReason {
    Timer,
    FileChange,
    /// Follow-up for triggers that arrived during the previous cycle
    Coalesced,
    Manual,
}

impl fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Timer => "timer",
            Self::FileChange => "file-change",
            Self::Coalesced => "coalesced",
            Self::Manual => "manual",
        };
        f.write_str(label)
    }
}

/// A request to run one cycle for a pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncTrigger {
    pub pair_name: String,
    pub reason: TriggerReason,
    pub timestamp: DateTime<Local>,
}

impl SyncTrigger {
    pub fn new(pair_name: impl Into<String>, reason: TriggerReason) -> Self {
        Self {
            pair_name: pair_name.into(),
            reason,
            timestamp: Local::now(),
        }
    }
}
