use anyhow::Result;
use async_trait::async_trait;
use git2::build::CheckoutBuilder;
use git2::{
    Commit, ErrorCode, IndexAddOption, IndexMatchedPath, Oid, Repository, RepositoryInitOptions,
    RepositoryState, Signature, Status, StatusOptions,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::remote::{
    GitCommand, GitOutput, Identity, is_missing_remote_branch, is_rejection, remote_url,
};
use super::{CommitOutcome, PullOutcome, PushOutcome, RepoAdapter, RepoStatus};
use crate::config::{GlobalSettings, SyncPair};
use crate::credentials::{CredentialResolver, Secret};
use crate::error::{SyncError, SyncResult};
use crate::shared::IgnoreMatcher;

/// Git-backed adapter for one sync pair.
///
/// Holds no repository handle between calls; each operation opens the working
/// copy fresh, so the adapter is cheap to clone into blocking workers.
#[derive(Clone)]
pub struct GitRepo {
    pair: Arc<SyncPair>,
    credentials: Arc<dyn CredentialResolver>,
    ignore: Arc<IgnoreMatcher>,
    fallback_identity: Identity,
}

fn mapped(kind: fn(String) -> SyncError) -> impl Fn(git2::Error) -> SyncError {
    move |e| kind(e.message().to_string())
}

impl GitRepo {
    pub fn new(
        pair: Arc<SyncPair>,
        credentials: Arc<dyn CredentialResolver>,
        global: &GlobalSettings,
    ) -> Result<Self> {
        let ignore = IgnoreMatcher::new(&pair.ignore_patterns)?;
        Ok(Self {
            pair,
            credentials,
            ignore: Arc::new(ignore),
            fallback_identity: Identity {
                name: global.author_name.clone(),
                email: global.author_email.clone(),
            },
        })
    }

    pub fn pair(&self) -> &SyncPair {
        &self.pair
    }

    fn workdir(&self) -> &Path {
        &self.pair.local_path
    }

    fn branch_ref(&self) -> String {
        format!("refs/heads/{}", self.pair.branch)
    }

    /// Resolve the pair's credential at use time
    fn secret(&self) -> SyncResult<Option<Secret>> {
        self.pair
            .credential_ref
            .as_deref()
            .map(|reference| self.credentials.resolve(reference))
            .transpose()
    }

    /// Identity for system git, only when the repository has none of its own
    fn identity_for(&self, repo: &Repository) -> Option<Identity> {
        repo.signature().is_err().then(|| self.fallback_identity.clone())
    }

    fn signature(&self, repo: &Repository) -> Result<Signature<'static>, git2::Error> {
        repo.signature().or_else(|_| {
            Signature::now(&self.fallback_identity.name, &self.fallback_identity.email)
        })
    }

    fn head_commit(repo: &Repository) -> Option<Commit<'_>> {
        repo.head().ok().and_then(|h| h.peel_to_commit().ok())
    }

    pub fn ensure_initialized_blocking(&self) -> SyncResult<()> {
        let secret = self.secret()?;
        let workdir = self.workdir();
        let setup_err = mapped(SyncError::RepoSetup);

        std::fs::create_dir_all(workdir).map_err(|e| {
            SyncError::RepoSetup(format!("cannot create {}: {e}", workdir.display()))
        })?;

        let (repo, fresh) = match Repository::open(workdir) {
            Ok(repo) => (repo, false),
            Err(e) if e.code() == ErrorCode::NotFound => {
                let mut opts = RepositoryInitOptions::new();
                opts.initial_head(&self.pair.branch);
                let repo = Repository::init_opts(workdir, &opts).map_err(&setup_err)?;
                tracing::info!(pair = %self.pair.name, phase = "setup", outcome = "initialized", "Initialized repository in {}", workdir.display());
                (repo, true)
            }
            Err(e) => return Err(setup_err(e)),
        };

        let url = remote_url(&self.pair.remote_ref);
        match repo.find_remote("origin") {
            Ok(remote) if remote.url() == Some(url.as_str()) => {}
            Ok(_) => repo.remote_set_url("origin", &url).map_err(&setup_err)?,
            Err(_) => {
                repo.remote("origin", &url).map_err(&setup_err)?;
            }
        }

        // Until the first commit lands, prove the remote is reachable with these credentials
        if fresh || Self::head_commit(&repo).is_none() {
            let probe = GitCommand::new(workdir)
                .auth(secret.as_ref())
                .run(&["ls-remote", "--heads", "origin", &self.pair.branch]);
            if !probe.success {
                return Err(SyncError::RepoSetup(format!(
                    "remote {} unreachable: {}",
                    url,
                    probe.error_message()
                )));
            }
        }

        self.ensure_on_branch(&repo)
    }

    fn ensure_on_branch(&self, repo: &Repository) -> SyncResult<()> {
        let branch_ref = self.branch_ref();
        match repo.head() {
            Ok(head) if head.is_branch() && head.name() == Some(branch_ref.as_str()) => Ok(()),
            Ok(_) => {
                let git = GitCommand::new(self.workdir());
                let checkout = git.run(&["checkout", &self.pair.branch]);
                if checkout.success {
                    return Ok(());
                }
                let create = git.run(&["checkout", "-b", &self.pair.branch]);
                if create.success {
                    Ok(())
                } else {
                    Err(SyncError::RepoSetup(format!(
                        "cannot switch to branch {}: {}",
                        self.pair.branch,
                        create.error_message()
                    )))
                }
            }
            // Unborn: point HEAD at the tracked branch so the first commit creates it
            Err(_) => repo
                .set_head(&branch_ref)
                .map_err(mapped(SyncError::RepoSetup)),
        }
    }

    pub fn pull_blocking(&self) -> SyncResult<PullOutcome> {
        let secret = self.secret()?;
        let pull_err = mapped(SyncError::Pull);
        let repo = Repository::open(self.workdir()).map_err(&pull_err)?;
        let identity = self.identity_for(&repo);
        let git = GitCommand::new(self.workdir())
            .auth(secret.as_ref())
            .identity(identity.as_ref());

        let fetch = git.run(&["fetch", "--quiet", "origin", &self.pair.branch]);
        if !fetch.success {
            if is_missing_remote_branch(&fetch.stderr) {
                tracing::debug!(pair = %self.pair.name, phase = "pull", outcome = "empty_remote");
                return Ok(PullOutcome::UpToDate);
            }
            return Err(SyncError::Pull(fetch.error_message()));
        }

        let fetched_id = self.fetched_oid(&git)?;
        let fetched = repo.find_commit(fetched_id).map_err(&pull_err)?;

        let Some(head) = Self::head_commit(&repo) else {
            self.adopt_remote(&repo, &fetched)?;
            return Ok(PullOutcome::Updated);
        };

        if head.id() == fetched.id()
            || repo
                .graph_descendant_of(head.id(), fetched.id())
                .map_err(&pull_err)?
        {
            return Ok(PullOutcome::UpToDate);
        }

        self.discard_conflicting_changes(&repo, &head, &fetched)?;

        let target = fetched_id.to_string();
        let merge = git.run(&[
            "merge",
            "--no-edit",
            "--allow-unrelated-histories",
            "-X",
            "theirs",
            &target,
        ]);
        if !merge.success {
            tracing::warn!(
                pair = %self.pair.name,
                phase = "pull",
                outcome = "resolving",
                error = %merge.error_message(),
                "Merge left conflicts, taking the remote side"
            );
            if let Err(e) = self.resolve_with_remote(&repo, &git, &fetched, &merge) {
                if repo.state() == RepositoryState::Merge {
                    git.run(&["merge", "--abort"]);
                }
                return Err(e);
            }
        }

        Ok(PullOutcome::Updated)
    }

    /// Finish a conflicted merge by taking the fetched version of every unmerged
    /// path. Paths the remote deleted are removed; everything else the merge
    /// already settled, including local-only files and commits, is kept.
    fn resolve_with_remote(
        &self,
        repo: &Repository,
        git: &GitCommand<'_>,
        fetched: &Commit<'_>,
        merge: &GitOutput,
    ) -> SyncResult<()> {
        if repo.state() != RepositoryState::Merge {
            return Err(SyncError::Pull(format!(
                "merge failed: {}",
                merge.error_message()
            )));
        }

        let unmerged = git.run(&["diff", "--name-only", "-z", "--diff-filter=U"]);
        if !unmerged.success {
            return Err(SyncError::Pull(unmerged.error_message()));
        }
        let remote_tree = fetched.tree().map_err(mapped(SyncError::Pull))?;

        for path in unmerged.stdout.split('\0').filter(|p| !p.is_empty()) {
            let step = if remote_tree.get_path(Path::new(path)).is_ok() {
                let checkout = git.run(&["checkout", "--theirs", "--", path]);
                if checkout.success {
                    git.run(&["add", "--", path])
                } else {
                    checkout
                }
            } else {
                git.run(&["rm", "--quiet", "--force", "--", path])
            };
            if !step.success {
                return Err(SyncError::Pull(format!(
                    "cannot resolve {path}: {}",
                    step.error_message()
                )));
            }
            tracing::warn!(pair = %self.pair.name, phase = "pull", path = %path, "Local change overwritten by remote");
        }

        let commit = git.run(&["commit", "--no-edit", "--quiet"]);
        if !commit.success {
            return Err(SyncError::Pull(format!(
                "cannot complete merge: {}",
                commit.error_message()
            )));
        }
        Ok(())
    }

    fn fetched_oid(&self, git: &GitCommand<'_>) -> SyncResult<Oid> {
        let rev = git.run(&["rev-parse", "FETCH_HEAD"]);
        if !rev.success {
            return Err(SyncError::Pull(rev.error_message()));
        }
        Oid::from_str(rev.stdout.trim()).map_err(mapped(SyncError::Pull))
    }

    /// First contact with a populated remote: take its branch wholesale.
    ///
    /// Tracked remote files overwrite local copies; local-only files stay and
    /// get committed by the next stage step.
    fn adopt_remote(&self, repo: &Repository, fetched: &Commit<'_>) -> SyncResult<()> {
        let pull_err = mapped(SyncError::Pull);
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.checkout_tree(fetched.as_object(), Some(&mut checkout))
            .map_err(&pull_err)?;
        repo.reference(
            &self.branch_ref(),
            fetched.id(),
            true,
            "mirrorsync: adopt remote branch",
        )
        .map_err(&pull_err)?;
        repo.set_head(&self.branch_ref()).map_err(&pull_err)?;

        tracing::info!(pair = %self.pair.name, phase = "pull", outcome = "adopted", "Adopted remote branch {}", self.pair.branch);
        Ok(())
    }

    /// Drop uncommitted local edits to any path the remote changed since the
    /// merge base, so the merge can proceed and the remote version wins.
    fn discard_conflicting_changes(
        &self,
        repo: &Repository,
        head: &Commit<'_>,
        fetched: &Commit<'_>,
    ) -> SyncResult<()> {
        let pull_err = mapped(SyncError::Pull);

        let base_tree = match repo.merge_base(head.id(), fetched.id()) {
            Ok(base) => Some(
                repo.find_commit(base)
                    .and_then(|c| c.tree())
                    .map_err(&pull_err)?,
            ),
            Err(_) => None,
        };
        let remote_tree = fetched.tree().map_err(&pull_err)?;
        let diff = repo
            .diff_tree_to_tree(base_tree.as_ref(), Some(&remote_tree), None)
            .map_err(&pull_err)?;

        let remote_paths: HashSet<PathBuf> = diff
            .deltas()
            .flat_map(|d| [d.old_file().path(), d.new_file().path()])
            .flatten()
            .map(Path::to_path_buf)
            .collect();
        if remote_paths.is_empty() {
            return Ok(());
        }

        // Unstage everything; merge refuses to run over a dirty index
        let mut index = repo.index().map_err(&pull_err)?;
        index
            .read_tree(&head.tree().map_err(&pull_err)?)
            .map_err(&pull_err)?;
        index.write().map_err(&pull_err)?;

        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = repo.statuses(Some(&mut opts)).map_err(&pull_err)?;

        let mut restore = Vec::new();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            if !remote_paths.contains(Path::new(path)) {
                continue;
            }
            tracing::warn!(pair = %self.pair.name, phase = "pull", path = %path, "Local change overwritten by remote");
            if entry.status().contains(Status::WT_NEW) {
                let _ = std::fs::remove_file(self.workdir().join(path));
            } else {
                restore.push(path.to_string());
            }
        }

        if !restore.is_empty() {
            let mut checkout = CheckoutBuilder::new();
            checkout.force();
            for path in &restore {
                checkout.path(path);
            }
            repo.checkout_head(Some(&mut checkout)).map_err(&pull_err)?;
        }

        Ok(())
    }

    pub fn commit_blocking(&self, message: &str) -> SyncResult<CommitOutcome> {
        let commit_err = mapped(SyncError::Commit);
        let repo = Repository::open(self.workdir()).map_err(&commit_err)?;
        let mut index = repo.index().map_err(&commit_err)?;

        let ignore = &self.ignore;
        let mut skip_ignored = |path: &Path, _spec: &[u8]| -> i32 {
            if ignore.is_ignored(path) { 1 } else { 0 }
        };
        index
            .add_all(
                ["*"].iter(),
                IndexAddOption::DEFAULT,
                Some(&mut skip_ignored as &mut IndexMatchedPath<'_>),
            )
            .map_err(&commit_err)?;
        index
            .update_all(["*"].iter(), Some(&mut skip_ignored as &mut IndexMatchedPath<'_>))
            .map_err(&commit_err)?;
        index.write().map_err(&commit_err)?;

        let tree_id = index.write_tree().map_err(&commit_err)?;
        let parent = Self::head_commit(&repo);
        let unchanged = match &parent {
            Some(parent) => parent.tree_id() == tree_id,
            None => index.is_empty(),
        };
        if unchanged {
            return Ok(CommitOutcome::NothingToCommit);
        }

        let tree = repo.find_tree(tree_id).map_err(&commit_err)?;
        let signature = self.signature(&repo).map_err(&commit_err)?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let oid = repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .map_err(&commit_err)?;

        Ok(CommitOutcome::Committed(oid.to_string()))
    }

    pub fn push_blocking(&self) -> SyncResult<PushOutcome> {
        let secret = self.secret()?;
        let repo = Repository::open(self.workdir()).map_err(mapped(SyncError::Push))?;
        if Self::head_commit(&repo).is_none() {
            return Ok(PushOutcome::UpToDate);
        }

        let refspec = format!("HEAD:{}", self.branch_ref());
        let push = GitCommand::new(self.workdir())
            .auth(secret.as_ref())
            .run(&["push", "--porcelain", "origin", &refspec]);

        if push.success {
            let up_to_date = push.stdout.lines().any(|l| l.starts_with('='));
            return Ok(if up_to_date {
                PushOutcome::UpToDate
            } else {
                PushOutcome::Pushed
            });
        }

        let report = format!("{}\n{}", push.stdout, push.stderr);
        if is_rejection(&report) {
            Err(SyncError::PushRejected(push.error_message()))
        } else {
            Err(SyncError::Push(push.error_message()))
        }
    }

    pub fn status_blocking(&self) -> SyncResult<RepoStatus> {
        let status_err = mapped(SyncError::RepoSetup);
        let repo = match Repository::open(self.workdir()) {
            Ok(repo) => repo,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(RepoStatus::default()),
            Err(e) => return Err(status_err(e)),
        };

        let branch = match repo.head() {
            Ok(head) => head.shorthand().map(str::to_string),
            Err(_) => repo
                .find_reference("HEAD")
                .ok()
                .and_then(|r| r.symbolic_target().map(str::to_string))
                .map(|t| t.trim_start_matches("refs/heads/").to_string()),
        };

        let head = Self::head_commit(&repo);
        let upstream = repo
            .find_reference(&format!("refs/remotes/origin/{}", self.pair.branch))
            .ok()
            .and_then(|r| r.target());

        let (ahead, behind) = match (&head, upstream) {
            (Some(head), Some(upstream)) => repo
                .graph_ahead_behind(head.id(), upstream)
                .map_err(&status_err)?,
            (Some(head), None) => {
                let mut walk = repo.revwalk().map_err(&status_err)?;
                walk.push(head.id()).map_err(&status_err)?;
                (walk.count(), 0)
            }
            (None, _) => (0, 0),
        };

        let mut opts = StatusOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let dirty_files = repo
            .statuses(Some(&mut opts))
            .map_err(&status_err)?
            .iter()
            .filter_map(|e| e.path().map(PathBuf::from))
            .filter(|p| !self.ignore.is_ignored(p))
            .count();

        Ok(RepoStatus {
            initialized: true,
            branch,
            head: head.map(|c| c.id().to_string()[..7].to_string()),
            ahead,
            behind,
            dirty_files,
        })
    }

    /// Run a blocking operation on the tokio blocking pool
    async fn offload<T, F>(&self, on_join_error: fn(String) -> SyncError, op: F) -> SyncResult<T>
    where
        T: Send + 'static,
        F: FnOnce(GitRepo) -> SyncResult<T> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || op(this))
            .await
            .map_err(|e| on_join_error(format!("git worker failed: {e}")))?
    }
}

#[async_trait]
impl RepoAdapter for GitRepo {
    async fn ensure_initialized(&self) -> SyncResult<()> {
        self.offload(SyncError::RepoSetup, |repo| repo.ensure_initialized_blocking())
            .await
    }

    async fn pull_remote_priority(&self) -> SyncResult<PullOutcome> {
        self.offload(SyncError::Pull, |repo| repo.pull_blocking()).await
    }

    async fn stage_and_commit(&self, message: &str) -> SyncResult<CommitOutcome> {
        let message = message.to_string();
        self.offload(SyncError::Commit, move |repo| repo.commit_blocking(&message))
            .await
    }

    async fn push(&self) -> SyncResult<PushOutcome> {
        self.offload(SyncError::Push, |repo| repo.push_blocking()).await
    }

    async fn status(&self) -> SyncResult<RepoStatus> {
        self.offload(SyncError::RepoSetup, |repo| repo.status_blocking())
            .await
    }
}
