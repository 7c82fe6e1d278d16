//! Per-pair sync scheduler
//!
//! Merges timer ticks and change signals into one serialized stream of cycles.
//! At most one cycle runs at a time; triggers that arrive meanwhile collapse into
//! a single `pending_trigger` flag that starts one follow-up cycle as soon as the
//! current one finishes.

use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::cycle::{CycleOutcome, RetryPolicy, run_cycle};
use super::{SyncState, SyncStatus, SyncTrigger, TriggerReason};
use crate::config::{GlobalSettings, SyncPair};
use crate::error::{SyncError, SyncResult};
use crate::git::RepoAdapter;
use crate::shared::IgnoreMatcher;
use crate::watch::{ChangeDetector, WatchEvent};

/// Timing and retry knobs for one scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub retry: RetryPolicy,
    pub debounce: Duration,
    /// Arm a filesystem watch (and re-arm it after failures)
    pub watch: bool,
}

impl SchedulerSettings {
    pub fn for_pair(pair: &SyncPair, global: &GlobalSettings) -> Self {
        Self {
            interval: pair.interval(global),
            retry: RetryPolicy::from_settings(global),
            debounce: global.debounce(),
            watch: global.watch,
        }
    }
}

/// What woke the scheduler loop
enum Wake {
    StopChanged { closed: bool },
    Tick,
    Signal(Option<WatchEvent>),
}

pub struct Scheduler {
    pair: Arc<SyncPair>,
    adapter: Arc<dyn RepoAdapter>,
    settings: SchedulerSettings,
    ignore: Arc<IgnoreMatcher>,
    detector: Option<ChangeDetector>,
}

impl Scheduler {
    pub fn new(
        pair: Arc<SyncPair>,
        adapter: Arc<dyn RepoAdapter>,
        settings: SchedulerSettings,
    ) -> SyncResult<Self> {
        let ignore = IgnoreMatcher::new(&pair.ignore_patterns)
            .map_err(|e| SyncError::config(&pair.name, e.to_string()))?;
        Ok(Self {
            pair,
            adapter,
            settings,
            ignore: Arc::new(ignore),
            detector: None,
        })
    }

    /// Use an already established change stream instead of arming one
    pub fn with_detector(mut self, detector: ChangeDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Start the scheduler loop on the current runtime
    pub fn spawn(self) -> SchedulerHandle {
        let (state_tx, state_rx) = watch::channel(SyncState::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        let pair = Arc::clone(&self.pair);
        let task = tokio::spawn(self.run(state_tx, stop_rx));
        SchedulerHandle {
            pair,
            state: state_rx,
            stop: stop_tx,
            task,
        }
    }

    async fn run(mut self, state: watch::Sender<SyncState>, mut stop: watch::Receiver<bool>) {
        let name = self.pair.name.clone();
        let period = self.settings.interval.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if self.detector.is_none() && self.settings.watch {
            if let Err(e) = self.arm_detector() {
                tracing::warn!(pair = %name, phase = "watch", outcome = "timer-only", error = %e);
            }
        }

        tracing::info!(
            pair = %name,
            phase = "scheduler",
            outcome = "started",
            interval_secs = period.as_secs(),
            watching = self.detector.is_some(),
        );

        let mut follow_up = false;
        loop {
            if *stop.borrow() {
                break;
            }

            let reason = if follow_up {
                follow_up = false;
                TriggerReason::Coalesced
            } else {
                let wake = tokio::select! {
                    changed = stop.changed() => Wake::StopChanged { closed: changed.is_err() },
                    _ = ticker.tick() => Wake::Tick,
                    event = next_signal(&mut self.detector) => Wake::Signal(event),
                };
                match wake {
                    Wake::StopChanged { closed: true } => break,
                    Wake::StopChanged { closed: false } => continue,
                    Wake::Tick => {
                        self.rearm_if_lost();
                        TriggerReason::Timer
                    }
                    Wake::Signal(Some(WatchEvent::Dirty)) => TriggerReason::FileChange,
                    Wake::Signal(other) => {
                        degrade(&mut self.detector, &name, other);
                        continue;
                    }
                }
            };

            let trigger = SyncTrigger::new(&name, reason);
            follow_up = self.execute(trigger, &state, &mut stop, &mut ticker).await;
        }

        if let Some(detector) = self.detector.take() {
            detector.stop();
        }
        state.send_modify(|s| {
            s.status = SyncStatus::Disabled;
            s.pending_trigger = false;
        });
        tracing::info!(pair = %name, phase = "scheduler", outcome = "disabled", "pair disabled");
    }

    /// Run one cycle while absorbing triggers. Returns whether a follow-up is due.
    async fn execute(
        &mut self,
        trigger: SyncTrigger,
        state: &watch::Sender<SyncState>,
        stop: &mut watch::Receiver<bool>,
        ticker: &mut Interval,
    ) -> bool {
        let name = self.pair.name.as_str();
        state.send_modify(|s| {
            s.status = SyncStatus::Syncing;
            s.pending_trigger = false;
        });
        tracing::info!(pair = %name, phase = "cycle", outcome = "started", reason = %trigger.reason);

        let cycle = run_cycle(
            self.adapter.as_ref(),
            &self.pair,
            self.settings.retry,
            stop.clone(),
        );
        tokio::pin!(cycle);

        let mut stop_open = true;
        let result = loop {
            let wake = tokio::select! {
                result = &mut cycle => break result,
                _ = ticker.tick() => Wake::Tick,
                event = next_signal(&mut self.detector) => Wake::Signal(event),
                changed = stop.changed(), if stop_open => Wake::StopChanged { closed: changed.is_err() },
            };
            let reason = match wake {
                Wake::Tick => TriggerReason::Timer,
                Wake::Signal(Some(WatchEvent::Dirty)) => TriggerReason::FileChange,
                Wake::Signal(other) => {
                    degrade(&mut self.detector, name, other);
                    continue;
                }
                // The cycle checks the flag itself at its next boundary
                Wake::StopChanged { closed } => {
                    stop_open = !closed;
                    continue;
                }
            };
            tracing::debug!(pair = %name, phase = "cycle", outcome = "coalesced", reason = %reason);
            state.send_modify(|s| s.pending_trigger = true);
        };

        match result {
            Ok(CycleOutcome::Aborted) => {
                state.send_modify(|s| {
                    if s.status == SyncStatus::Syncing {
                        s.status = if s.last_error.is_some() {
                            SyncStatus::Error
                        } else {
                            SyncStatus::Idle
                        };
                    }
                });
            }
            Ok(outcome) => {
                state.send_modify(|s| {
                    s.status = SyncStatus::Idle;
                    s.last_sync_time = Some(Local::now());
                    s.last_error = None;
                    s.consecutive_failures = 0;
                });
                tracing::info!(pair = %name, phase = "cycle", outcome = outcome.label());
            }
            Err(e) => {
                state.send_modify(|s| {
                    s.status = SyncStatus::Error;
                    s.last_error = Some(e.to_string());
                    s.consecutive_failures += 1;
                });
                tracing::error!(
                    pair = %name,
                    phase = e.phase(),
                    outcome = "failed",
                    consecutive_failures = state.borrow().consecutive_failures,
                    error = %e,
                );
            }
        }

        state.borrow().pending_trigger && !*stop.borrow()
    }

    fn arm_detector(&mut self) -> SyncResult<()> {
        let detector = ChangeDetector::start(
            &self.pair.local_path,
            Arc::clone(&self.ignore),
            self.settings.debounce,
        )?;
        self.detector = Some(detector);
        Ok(())
    }

    fn rearm_if_lost(&mut self) {
        if !self.settings.watch || self.detector.is_some() {
            return;
        }
        match self.arm_detector() {
            Ok(()) => {
                tracing::info!(pair = %self.pair.name, phase = "watch", outcome = "re-armed");
            }
            Err(e) => {
                tracing::debug!(pair = %self.pair.name, phase = "watch", outcome = "still timer-only", error = %e);
            }
        }
    }
}

/// Next change signal, or never when no detector is armed
async fn next_signal(detector: &mut Option<ChangeDetector>) -> Option<WatchEvent> {
    match detector {
        Some(detector) => detector.next().await,
        None => std::future::pending().await,
    }
}

/// Drop a failed detector and fall back to timer-only triggering
fn degrade(detector: &mut Option<ChangeDetector>, pair: &str, event: Option<WatchEvent>) {
    let error = match event {
        Some(WatchEvent::Failed(e)) => e,
        _ => SyncError::Watch("change stream closed".to_string()),
    };
    tracing::warn!(pair = %pair, phase = "watch", outcome = "timer-only", error = %error);
    if let Some(detector) = detector.take() {
        detector.stop();
    }
}

/// Owner's side of a running scheduler
pub struct SchedulerHandle {
    pair: Arc<SyncPair>,
    state: watch::Receiver<SyncState>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Point-in-time copy of the pair's state
    pub fn snapshot(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Live view of state changes
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Ask the scheduler to stop at its next cycle boundary
    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    /// Stop and wait for the scheduler to finish its in-flight work
    pub async fn stop(self) -> SyncState {
        self.request_stop();
        if let Err(e) = self.task.await {
            tracing::error!(pair = %self.pair.name, phase = "scheduler", outcome = "crashed", error = %e);
        }
        self.state.borrow().clone()
    }
}
