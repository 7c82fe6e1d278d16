//! Orchestrator: owns one scheduler per registered pair

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::scheduler::{Scheduler, SchedulerHandle, SchedulerSettings};
use super::{SyncState, SyncStatus};
use crate::config::{GlobalSettings, PairRegistry, RejectedPair, SyncConfig, SyncPair};
use crate::credentials::EnvCredentials;
use crate::error::{SyncError, SyncResult};
use crate::git::{GitRepo, RepoAdapter};

/// Builds the repository adapter for a pair
pub type AdapterFactory = dyn Fn(&Arc<SyncPair>) -> SyncResult<Arc<dyn RepoAdapter>> + Send + Sync;

/// One row of the status report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairSnapshot {
    pub name: String,
    pub state: SyncState,
}

pub struct Orchestrator {
    registry: PairRegistry,
    global: GlobalSettings,
    factory: Box<AdapterFactory>,
    rejected: Vec<RejectedPair>,
    schedulers: BTreeMap<String, SchedulerHandle>,
}

impl Orchestrator {
    pub fn new<F>(registry: PairRegistry, global: GlobalSettings, factory: F) -> Self
    where
        F: Fn(&Arc<SyncPair>) -> SyncResult<Arc<dyn RepoAdapter>> + Send + Sync + 'static,
    {
        Self {
            registry,
            global,
            factory: Box::new(factory),
            rejected: Vec::new(),
            schedulers: BTreeMap::new(),
        }
    }

    /// Validate `config` and wire every valid pair to a git adapter that reads
    /// credentials from the environment
    pub fn from_config(config: &SyncConfig) -> Self {
        let (registry, rejected) = PairRegistry::from_config(config);
        let global = config.global.clone();
        let adapter_global = global.clone();
        let credentials = Arc::new(EnvCredentials);

        let mut orchestrator = Self::new(registry, global, move |pair| {
            let repo = GitRepo::new(Arc::clone(pair), credentials.clone(), &adapter_global)
                .map_err(|e| SyncError::config(&pair.name, e.to_string()))?;
            Ok(Arc::new(repo) as Arc<dyn RepoAdapter>)
        });
        orchestrator.rejected = rejected;
        orchestrator
    }

    /// Spawn a scheduler for every registered pair not already running.
    /// Returns how many were started.
    pub fn start(&mut self) -> usize {
        let pairs: Vec<Arc<SyncPair>> = self.registry.iter().cloned().collect();
        let mut started = 0;

        for pair in pairs {
            if self.schedulers.contains_key(&pair.name) {
                continue;
            }
            match self.spawn_scheduler(&pair) {
                Ok(handle) => {
                    self.schedulers.insert(pair.name.clone(), handle);
                    started += 1;
                }
                Err(error) => {
                    tracing::error!(pair = %pair.name, phase = error.phase(), outcome = "rejected", error = %error);
                    self.registry.remove(&pair.name);
                    self.rejected.push(RejectedPair {
                        name: pair.name.clone(),
                        error,
                    });
                }
            }
        }

        tracing::info!(started, total = self.schedulers.len(), "Sync pairs running");
        started
    }

    fn spawn_scheduler(&self, pair: &Arc<SyncPair>) -> SyncResult<SchedulerHandle> {
        let adapter = (self.factory)(pair)?;
        let settings = SchedulerSettings::for_pair(pair, &self.global);
        Ok(Scheduler::new(Arc::clone(pair), adapter, settings)?.spawn())
    }

    /// Signal every scheduler, then wait for each to finish its in-flight cycle
    pub async fn stop(&mut self) {
        for handle in self.schedulers.values() {
            handle.request_stop();
        }
        for (name, handle) in std::mem::take(&mut self.schedulers) {
            let state = handle.stop().await;
            tracing::debug!(pair = %name, status = %state.status, "Scheduler stopped");
        }
    }

    /// Stop a single pair; the others keep running
    pub async fn stop_pair(&mut self, name: &str) -> Option<SyncState> {
        let handle = self.schedulers.remove(name)?;
        Some(handle.stop().await)
    }

    pub fn status(&self, name: &str) -> Option<SyncState> {
        if let Some(handle) = self.schedulers.get(name) {
            return Some(handle.snapshot());
        }
        self.rejected
            .iter()
            .find(|r| r.name == name)
            .map(|r| SyncState::rejected(r.error.to_string()))
    }

    /// Status of every pair, running or rejected, sorted by name
    pub fn snapshot(&self) -> Vec<PairSnapshot> {
        let mut rows: Vec<PairSnapshot> = self
            .schedulers
            .iter()
            .map(|(name, handle)| PairSnapshot {
                name: name.clone(),
                state: handle.snapshot(),
            })
            .collect();

        // Registered but not started yet
        rows.extend(
            self.registry
                .iter()
                .filter(|p| !self.schedulers.contains_key(&p.name))
                .map(|p| PairSnapshot {
                    name: p.name.clone(),
                    state: SyncState {
                        status: SyncStatus::Disabled,
                        ..SyncState::default()
                    },
                }),
        );

        rows.extend(self.rejected.iter().map(|r| PairSnapshot {
            name: r.name.clone(),
            state: SyncState::rejected(r.error.to_string()),
        }));

        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    pub fn registry(&self) -> &PairRegistry {
        &self.registry
    }

    pub fn rejected(&self) -> &[RejectedPair] {
        &self.rejected
    }

    pub fn running(&self) -> usize {
        self.schedulers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::FakeRepo;
    use std::collections::HashMap;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::sleep;

    fn quiet_global() -> GlobalSettings {
        GlobalSettings {
            sync_interval: 60,
            watch: false,
            ..GlobalSettings::default()
        }
    }

    fn registry(temp: &TempDir, names: &[&str]) -> PairRegistry {
        let config = SyncConfig {
            global: quiet_global(),
            sync_pairs: names
                .iter()
                .map(|n| SyncPair::new(*n, temp.path().join(n), format!("me/{n}")))
                .collect(),
        };
        let (registry, rejected) = PairRegistry::from_config(&config);
        assert!(rejected.is_empty());
        registry
    }

    fn orchestrator(registry: PairRegistry, repos: &HashMap<&'static str, Arc<FakeRepo>>) -> Orchestrator {
        let repos: HashMap<String, Arc<FakeRepo>> = repos
            .iter()
            .map(|(k, v)| (k.to_string(), Arc::clone(v)))
            .collect();
        Orchestrator::new(registry, quiet_global(), move |pair| {
            repos
                .get(&pair.name)
                .map(|r| Arc::clone(r) as Arc<dyn RepoAdapter>)
                .ok_or_else(|| SyncError::config(&pair.name, "no adapter"))
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_pair_does_not_affect_others() {
        let temp = TempDir::new().unwrap();
        let broken = Arc::new(FakeRepo::new());
        broken.fail_pulls(Some(SyncError::Pull("host unreachable".into())));
        let healthy = Arc::new(FakeRepo::new());
        healthy.mark_dirty();

        let repos = HashMap::from([("broken", broken.clone()), ("healthy", healthy.clone())]);
        let mut orch = orchestrator(registry(&temp, &["broken", "healthy"]), &repos);
        assert_eq!(orch.start(), 2);

        sleep(Duration::from_secs(61)).await;

        let rows = orch.snapshot();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "broken");
        assert_eq!(rows[0].state.status, SyncStatus::Error);
        assert_eq!(rows[1].state.status, SyncStatus::Idle);
        assert!(rows[1].state.last_sync_time.is_some());
        assert_eq!(healthy.counts().pushes, 1);

        orch.stop().await;
        assert_eq!(orch.running(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopping_one_pair_leaves_the_rest() {
        let temp = TempDir::new().unwrap();
        let a = Arc::new(FakeRepo::new());
        let b = Arc::new(FakeRepo::new());
        let repos = HashMap::from([("a", a.clone()), ("b", b.clone())]);
        let mut orch = orchestrator(registry(&temp, &["a", "b"]), &repos);
        orch.start();

        let stopped = orch.stop_pair("a").await.unwrap();
        assert_eq!(stopped.status, SyncStatus::Disabled);

        sleep(Duration::from_secs(61)).await;
        assert_eq!(a.counts().initializations, 0);
        assert_eq!(b.counts().initializations, 1);
        assert_eq!(orch.status("b").unwrap().status, SyncStatus::Idle);

        orch.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_adapter_failure_is_reported_not_fatal() {
        let temp = TempDir::new().unwrap();
        let ok = Arc::new(FakeRepo::new());
        let repos = HashMap::from([("ok", ok.clone())]);
        let mut orch = orchestrator(registry(&temp, &["missing", "ok"]), &repos);

        assert_eq!(orch.start(), 1);
        assert_eq!(orch.rejected().len(), 1);

        let missing = orch.status("missing").unwrap();
        assert_eq!(missing.status, SyncStatus::Disabled);
        assert!(missing.last_error.unwrap().contains("no adapter"));

        orch.stop().await;
    }

    #[test]
    fn test_rejected_config_pairs_appear_in_snapshot() {
        let temp = TempDir::new().unwrap();
        let config = SyncConfig {
            global: quiet_global(),
            sync_pairs: vec![
                SyncPair::new("dup", temp.path().join("one"), "me/one"),
                SyncPair::new("dup", temp.path().join("two"), "me/two"),
            ],
        };
        let orch = Orchestrator::from_config(&config);

        let rows = orch.snapshot();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.state.status == SyncStatus::Disabled));
        assert!(rows.iter().any(|r| r.state.last_error.is_some()));
    }
}
