use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::path::Path;
use std::process::Command;

use crate::credentials::Secret;

/// Captured result of a system git invocation
#[derive(Debug)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl GitOutput {
    /// Best single-line description of a failure
    pub fn error_message(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Identity injected into git processes that may create commits (merges)
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// Options for one system git invocation in a pair's working directory
pub struct GitCommand<'a> {
    workdir: &'a Path,
    auth: Option<&'a Secret>,
    identity: Option<&'a Identity>,
}

impl<'a> GitCommand<'a> {
    pub fn new(workdir: &'a Path) -> Self {
        Self {
            workdir,
            auth: None,
            identity: None,
        }
    }

    pub fn auth(mut self, secret: Option<&'a Secret>) -> Self {
        self.auth = secret;
        self
    }

    pub fn identity(mut self, identity: Option<&'a Identity>) -> Self {
        self.identity = identity;
        self
    }

    /// Run git with `args`. Spawn failures are reported as a failed output.
    pub fn run(&self, args: &[&str]) -> GitOutput {
        let mut command = Command::new("git");
        command
            .args(args)
            .current_dir(self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C");

        // Credentials travel through the environment only, never argv or .git/config
        if let Some(secret) = self.auth {
            let token = STANDARD.encode(format!("x-access-token:{}", secret.expose()));
            command
                .env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", format!("Authorization: Basic {token}"));
        }

        if let Some(identity) = self.identity {
            command
                .env("GIT_AUTHOR_NAME", &identity.name)
                .env("GIT_AUTHOR_EMAIL", &identity.email)
                .env("GIT_COMMITTER_NAME", &identity.name)
                .env("GIT_COMMITTER_EMAIL", &identity.email);
        }

        tracing::trace!("git {}", args.join(" "));

        match command.output() {
            Ok(output) => GitOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => GitOutput {
                success: false,
                stdout: String::new(),
                stderr: format!("failed to run git: {e}"),
            },
        }
    }
}

/// Resolve a `remote_ref` into something git can fetch from.
///
/// `owner/repo` shorthand points at GitHub; URLs, scp-style addresses and
/// filesystem paths pass through unchanged.
pub fn remote_url(remote_ref: &str) -> String {
    let remote_ref = remote_ref.trim();
    if is_verbatim_remote(remote_ref) {
        return remote_ref.to_string();
    }
    let repo = remote_ref.trim_end_matches(".git");
    format!("https://github.com/{repo}.git")
}

fn is_verbatim_remote(remote_ref: &str) -> bool {
    remote_ref.contains("://")
        || remote_ref.starts_with("git@")
        || remote_ref.starts_with('/')
        || remote_ref.starts_with('.')
        || remote_ref.starts_with('~')
        || Path::new(remote_ref).is_absolute()
        || remote_ref.split('/').count() != 2
}

/// Whether push stderr describes a race with a remote that moved on
pub fn is_rejection(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    ["[rejected]", "non-fast-forward", "fetch first", "updates were rejected"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Whether fetch stderr says the branch simply does not exist yet
pub fn is_missing_remote_branch(stderr: &str) -> bool {
    stderr.to_lowercase().contains("couldn't find remote ref")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_url_shorthand() {
        assert_eq!(remote_url("me/docs"), "https://github.com/me/docs.git");
        assert_eq!(remote_url("me/docs.git"), "https://github.com/me/docs.git");
    }

    #[test]
    fn test_remote_url_verbatim() {
        assert_eq!(
            remote_url("https://gitlab.com/me/docs.git"),
            "https://gitlab.com/me/docs.git"
        );
        assert_eq!(remote_url("git@github.com:me/docs.git"), "git@github.com:me/docs.git");
        assert_eq!(remote_url("/srv/git/docs.git"), "/srv/git/docs.git");
        assert_eq!(remote_url("file:///srv/git/docs.git"), "file:///srv/git/docs.git");
    }

    #[test]
    fn test_rejection_detection() {
        assert!(is_rejection(
            " ! [rejected]        main -> main (fetch first)\nerror: failed to push some refs"
        ));
        assert!(is_rejection("Updates were rejected because the tip of your current branch is behind"));
        assert!(!is_rejection("fatal: Authentication failed for 'https://github.com/me/docs.git/'"));
    }

    #[test]
    fn test_missing_branch_detection() {
        assert!(is_missing_remote_branch("fatal: couldn't find remote ref main"));
        assert!(!is_missing_remote_branch("fatal: repository not found"));
    }

    #[test]
    fn test_error_message_joins_lines() {
        let output = GitOutput {
            success: false,
            stdout: String::new(),
            stderr: "error: one\n\nhint: two\n".to_string(),
        };
        assert_eq!(output.error_message(), "error: one; hint: two");
    }
}
