//! Repository adapter against real git remotes on the local filesystem

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use mirrorsync::config::registry::validate_pair;
use mirrorsync::credentials::EnvCredentials;
use mirrorsync::git::{CommitOutcome, GitRepo, PullOutcome, RepoAdapter};
use mirrorsync::sync::{CycleOutcome, RetryPolicy, run_cycle};
use mirrorsync::{GlobalSettings, SyncError, SyncPair};
use tempfile::TempDir;
use tokio::sync::watch;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Peer")
        .env("GIT_AUTHOR_EMAIL", "peer@example.com")
        .env("GIT_COMMITTER_NAME", "Peer")
        .env("GIT_COMMITTER_EMAIL", "peer@example.com")
        .output()
        .expect("git is installed");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Temp area holding a bare remote, a peer clone and the mirrored folder
struct Fixture {
    temp: TempDir,
    remote: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let remote = temp.path().join("remote.git");
        fs::create_dir(&remote).unwrap();
        git(&remote, &["init", "--bare", "--quiet"]);
        Self { temp, remote }
    }

    fn mirror_dir(&self) -> PathBuf {
        self.temp.path().join("mirror")
    }

    fn repo(&self, patterns: &[&str]) -> GitRepo {
        let global = GlobalSettings::default();
        let mut pair = SyncPair::new(
            "mirror",
            self.mirror_dir(),
            self.remote.to_string_lossy().to_string(),
        );
        pair.ignore_patterns = patterns.iter().map(|p| p.to_string()).collect();
        let pair = validate_pair(&pair, &global).unwrap();
        GitRepo::new(Arc::new(pair), Arc::new(EnvCredentials), &global).unwrap()
    }

    /// Second working copy standing in for another machine
    fn peer(&self) -> PathBuf {
        let peer = self.temp.path().join("peer");
        if !peer.exists() {
            fs::create_dir(&peer).unwrap();
            git(&peer, &["init", "--quiet"]);
            git(&peer, &["checkout", "--quiet", "-b", "main"]);
            git(&peer, &["remote", "add", "origin", &self.remote.to_string_lossy()]);
        }
        let heads = git(&peer, &["ls-remote", "--heads", "origin", "main"]);
        if !heads.trim().is_empty() {
            git(&peer, &["fetch", "--quiet", "origin", "main"]);
            git(&peer, &["reset", "--quiet", "--hard", "FETCH_HEAD"]);
        }
        peer
    }

    fn peer_commit(&self, file: &str, content: &str) {
        let peer = self.peer();
        fs::write(peer.join(file), content).unwrap();
        git(&peer, &["add", "-A"]);
        git(&peer, &["commit", "--quiet", "-m", "peer edit"]);
        git(&peer, &["push", "--quiet", "origin", "HEAD:refs/heads/main"]);
    }

    fn remote_file(&self, file: &str) -> String {
        git(&self.remote, &["show", &format!("main:{file}")])
    }

    fn remote_files(&self) -> Vec<String> {
        git(&self.remote, &["ls-tree", "-r", "--name-only", "main"])
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        retry_delay: Duration::from_millis(10),
    }
}

async fn cycle(repo: &GitRepo) -> Result<CycleOutcome, SyncError> {
    let (_stop, rx) = watch::channel(false);
    run_cycle(repo, repo.pair(), policy(), rx).await
}

#[tokio::test]
async fn test_first_cycle_publishes_local_files() {
    let fx = Fixture::new();
    let repo = fx.repo(&[]);
    fs::write(fx.mirror_dir().join("notes.md"), "hello\n").unwrap();

    let outcome = cycle(&repo).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Synced { pushed: true, .. }));
    assert_eq!(fx.remote_file("notes.md"), "hello\n");

    let status = repo.status().await.unwrap();
    assert_eq!(status.branch.as_deref(), Some("main"));
    assert_eq!(status.ahead, 0);
    assert_eq!(status.dirty_files, 0);
}

#[tokio::test]
async fn test_ignored_files_never_reach_the_remote() {
    let fx = Fixture::new();
    let repo = fx.repo(&["*.pyc", "build/"]);
    fs::write(fx.mirror_dir().join("mod.py"), "print('hi')\n").unwrap();
    fs::write(fx.mirror_dir().join("mod.pyc"), "bytecode").unwrap();
    fs::create_dir(fx.mirror_dir().join("build")).unwrap();
    fs::write(fx.mirror_dir().join("build").join("out.o"), "obj").unwrap();

    cycle(&repo).await.unwrap();

    assert_eq!(fx.remote_files(), vec!["mod.py".to_string()]);
    assert_eq!(repo.status().await.unwrap().dirty_files, 0);
}

#[tokio::test]
async fn test_repeat_cycle_is_a_noop() {
    let fx = Fixture::new();
    let repo = fx.repo(&[]);
    fs::write(fx.mirror_dir().join("a.txt"), "a\n").unwrap();

    cycle(&repo).await.unwrap();
    let head = repo.status().await.unwrap().head;

    assert_eq!(cycle(&repo).await.unwrap(), CycleOutcome::NoOp);
    assert_eq!(repo.status().await.unwrap().head, head);
    assert_eq!(
        repo.stage_and_commit("Sync: nothing").await.unwrap(),
        CommitOutcome::NothingToCommit
    );
}

#[tokio::test]
async fn test_remote_wins_over_uncommitted_edit() {
    let fx = Fixture::new();
    fx.peer_commit("shared.md", "base\n");
    let repo = fx.repo(&[]);
    cycle(&repo).await.unwrap();
    assert_eq!(fs::read_to_string(fx.mirror_dir().join("shared.md")).unwrap(), "base\n");

    fx.peer_commit("shared.md", "remote\n");
    fs::write(fx.mirror_dir().join("shared.md"), "local\n").unwrap();

    cycle(&repo).await.unwrap();
    assert_eq!(
        fs::read_to_string(fx.mirror_dir().join("shared.md")).unwrap(),
        "remote\n"
    );
    assert_eq!(fx.remote_file("shared.md"), "remote\n");
}

#[tokio::test]
async fn test_remote_wins_over_committed_edit() {
    let fx = Fixture::new();
    fx.peer_commit("shared.md", "base\n");
    let repo = fx.repo(&[]);
    cycle(&repo).await.unwrap();

    fs::write(fx.mirror_dir().join("shared.md"), "local\n").unwrap();
    fs::write(fx.mirror_dir().join("mine.md"), "only here\n").unwrap();
    assert!(matches!(
        repo.stage_and_commit("local edit").await.unwrap(),
        CommitOutcome::Committed(_)
    ));
    fx.peer_commit("shared.md", "remote\n");

    let outcome = cycle(&repo).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Synced { pulled: true, pushed: true, .. }));
    assert_eq!(
        fs::read_to_string(fx.mirror_dir().join("shared.md")).unwrap(),
        "remote\n"
    );
    assert_eq!(fx.remote_file("shared.md"), "remote\n");
    assert_eq!(fx.remote_file("mine.md"), "only here\n");
}

#[tokio::test]
async fn test_remote_edit_beats_unpushed_local_delete() {
    let fx = Fixture::new();
    fx.peer_commit("shared.md", "base\n");
    let repo = fx.repo(&[]);
    cycle(&repo).await.unwrap();

    fs::remove_file(fx.mirror_dir().join("shared.md")).unwrap();
    fs::write(fx.mirror_dir().join("mine.md"), "only here\n").unwrap();
    assert!(matches!(
        repo.stage_and_commit("local delete").await.unwrap(),
        CommitOutcome::Committed(_)
    ));
    fx.peer_commit("shared.md", "remote\n");

    let outcome = cycle(&repo).await.unwrap();
    assert!(matches!(outcome, CycleOutcome::Synced { pulled: true, pushed: true, .. }));
    assert_eq!(
        fs::read_to_string(fx.mirror_dir().join("shared.md")).unwrap(),
        "remote\n"
    );
    assert_eq!(
        fs::read_to_string(fx.mirror_dir().join("mine.md")).unwrap(),
        "only here\n"
    );
    assert_eq!(fx.remote_file("shared.md"), "remote\n");
    assert_eq!(fx.remote_file("mine.md"), "only here\n");
}

#[tokio::test]
async fn test_remote_delete_beats_unpushed_local_edit() {
    let fx = Fixture::new();
    fx.peer_commit("shared.md", "base\n");
    let repo = fx.repo(&[]);
    cycle(&repo).await.unwrap();

    fs::write(fx.mirror_dir().join("shared.md"), "local\n").unwrap();
    repo.stage_and_commit("local edit").await.unwrap();
    let peer = fx.peer();
    git(&peer, &["rm", "--quiet", "shared.md"]);
    fs::write(peer.join("other.md"), "other\n").unwrap();
    git(&peer, &["add", "-A"]);
    git(&peer, &["commit", "--quiet", "-m", "peer delete"]);
    git(&peer, &["push", "--quiet", "origin", "HEAD:refs/heads/main"]);

    cycle(&repo).await.unwrap();
    assert!(!fx.mirror_dir().join("shared.md").exists());
    assert_eq!(fx.remote_files(), vec!["other.md".to_string()]);
}

#[tokio::test]
async fn test_existing_folder_adopts_remote_branch() {
    let fx = Fixture::new();
    fx.peer_commit("readme.md", "from remote\n");

    fs::create_dir_all(fx.mirror_dir()).unwrap();
    fs::write(fx.mirror_dir().join("readme.md"), "stale local copy\n").unwrap();
    fs::write(fx.mirror_dir().join("local-only.txt"), "keep me\n").unwrap();

    let repo = fx.repo(&[]);
    cycle(&repo).await.unwrap();

    assert_eq!(
        fs::read_to_string(fx.mirror_dir().join("readme.md")).unwrap(),
        "from remote\n"
    );
    assert_eq!(fx.remote_file("local-only.txt"), "keep me\n");
}

#[tokio::test]
async fn test_push_behind_remote_is_a_rejection() {
    let fx = Fixture::new();
    let repo = fx.repo(&[]);
    fs::write(fx.mirror_dir().join("a.txt"), "a\n").unwrap();
    cycle(&repo).await.unwrap();

    fx.peer_commit("b.txt", "b\n");
    fs::write(fx.mirror_dir().join("c.txt"), "c\n").unwrap();
    repo.stage_and_commit("local").await.unwrap();

    let err = repo.push().await.unwrap_err();
    assert!(err.is_push_rejection(), "unexpected error: {err}");

    // A full cycle re-pulls and gets through
    assert_eq!(repo.pull_remote_priority().await.unwrap(), PullOutcome::Updated);
    cycle(&repo).await.unwrap();
    let files = fx.remote_files();
    assert!(files.contains(&"b.txt".to_string()));
    assert!(files.contains(&"c.txt".to_string()));
}

#[tokio::test]
async fn test_unreachable_remote_fails_setup() {
    let fx = Fixture::new();
    let global = GlobalSettings::default();
    let pair = SyncPair::new(
        "lost",
        fx.temp.path().join("lost"),
        fx.temp.path().join("missing.git").to_string_lossy().to_string(),
    );
    let pair = validate_pair(&pair, &global).unwrap();
    let repo = GitRepo::new(Arc::new(pair), Arc::new(EnvCredentials), &global).unwrap();

    let err = repo.ensure_initialized().await.unwrap_err();
    assert!(matches!(err, SyncError::RepoSetup(_)), "unexpected error: {err}");

    // The half-initialized folder must not pass on a second attempt
    let err = repo.ensure_initialized().await.unwrap_err();
    assert!(matches!(err, SyncError::RepoSetup(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn test_missing_credential_is_reported() {
    let fx = Fixture::new();
    let global = GlobalSettings::default();
    let mut pair = SyncPair::new(
        "secret",
        fx.mirror_dir(),
        fx.remote.to_string_lossy().to_string(),
    );
    pair.credential_ref = Some("${MIRRORSYNC_TEST_TOKEN_THAT_IS_NOT_SET}".to_string());
    let pair = validate_pair(&pair, &global).unwrap();
    let repo = GitRepo::new(Arc::new(pair), Arc::new(EnvCredentials), &global).unwrap();

    let err = repo.ensure_initialized().await.unwrap_err();
    assert_eq!(
        err,
        SyncError::CredentialMissing("MIRRORSYNC_TEST_TOKEN_THAT_IS_NOT_SET".to_string())
    );
}

#[tokio::test]
async fn test_status_of_uninitialized_folder() {
    let fx = Fixture::new();
    let repo = fx.repo(&[]);
    let status = repo.status().await.unwrap();
    assert!(!status.initialized);
    assert_eq!(status.ahead, 0);
}
