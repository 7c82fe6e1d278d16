use anyhow::Result;
use clap::{Args, ValueEnum};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::cli::Output;
use crate::config::SyncConfig;
use crate::credentials::EnvCredentials;
use crate::git::{GitRepo, RepoAdapter, RepoStatus};
use crate::sync::{Orchestrator, SyncState};

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum StatusFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Default)]
pub struct StatusArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = StatusFormat::Text)]
    pub format: StatusFormat,
}

#[derive(Debug, Serialize)]
struct PairReport {
    name: String,
    #[serde(flatten)]
    state: SyncState,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository: Option<RepoStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    repository_error: Option<String>,
}

pub async fn execute(args: StatusArgs, config_path: &Path, output: &Output) -> Result<()> {
    let config = SyncConfig::load(config_path)?;
    let orchestrator = Orchestrator::from_config(&config);
    let credentials = Arc::new(EnvCredentials);

    let mut reports = Vec::new();
    for row in orchestrator.snapshot() {
        let (repository, repository_error) = match orchestrator.registry().get(&row.name) {
            Some(pair) if row.state.last_error.is_none() => {
                match GitRepo::new(Arc::clone(pair), credentials.clone(), &config.global) {
                    Ok(repo) => match repo.status().await {
                        Ok(status) => (Some(status), None),
                        Err(e) => (None, Some(e.to_string())),
                    },
                    Err(e) => (None, Some(e.to_string())),
                }
            }
            _ => (None, None),
        };
        reports.push(PairReport {
            name: row.name,
            state: row.state,
            repository,
            repository_error,
        });
    }

    match args.format {
        StatusFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        StatusFormat::Text => print_text(&reports, output),
    }
    Ok(())
}

fn print_text(reports: &[PairReport], output: &Output) {
    if reports.is_empty() {
        output.info("No sync pairs configured.");
        return;
    }

    for report in reports {
        output.pair_heading(&report.name, report.state.status);

        let last_sync = report
            .state
            .last_sync_time
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        output.table_row("Last sync", &last_sync);
        if report.state.consecutive_failures > 0 {
            output.table_row(
                "Failures",
                &report.state.consecutive_failures.to_string(),
            );
        }
        if let Some(error) = &report.state.last_error {
            output.table_row("Last error", error);
        }

        match (&report.repository, &report.repository_error) {
            (Some(repo), _) if repo.initialized => {
                output.table_row("Branch", repo.branch.as_deref().unwrap_or("detached"));
                output.table_row("Head", repo.head.as_deref().unwrap_or("(no commits)"));
                output.table_row(
                    "Ahead / behind",
                    &format!("{} / {}", repo.ahead, repo.behind),
                );
                output.table_row("Dirty files", &repo.dirty_files.to_string());
            }
            (Some(_), _) => output.table_row("Repository", "not initialized"),
            (None, Some(error)) => output.table_row("Repository", error),
            (None, None) => {}
        }
    }
    output.blank_line();
}
