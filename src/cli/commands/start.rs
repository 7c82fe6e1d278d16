use anyhow::{Context, Result, bail};
use clap::Args;
use std::path::Path;

use crate::cli::Output;
use crate::config::SyncConfig;
use crate::sync::Orchestrator;

#[derive(Args)]
pub struct StartArgs {
    /// Only sync on the timer; skip filesystem watching
    #[arg(long)]
    pub no_watch: bool,
}

pub async fn execute(args: StartArgs, config_path: &Path, output: &Output) -> Result<()> {
    let mut config = SyncConfig::load(config_path)?;
    if args.no_watch {
        config.global.watch = false;
    }

    let mut orchestrator = Orchestrator::from_config(&config);
    for rejected in orchestrator.rejected() {
        output.warning(&format!("Skipping '{}': {}", rejected.name, rejected.error));
    }
    if orchestrator.registry().is_empty() {
        bail!("No valid sync pairs in {}", config_path.display());
    }

    let started = orchestrator.start();
    output.success(&format!(
        "Syncing {started} pair(s): {}. Press Ctrl+C to stop.",
        orchestrator.registry().names().join(", ")
    ));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the interrupt signal")?;

    output.step("Stopping; waiting for in-flight syncs to finish");
    orchestrator.stop().await;
    output.success("Stopped");
    Ok(())
}
