use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::Output;
use crate::config::{DEFAULT_CONFIG_FILE, GlobalSettings, SyncConfig};
use crate::logging::setup_logging;

pub mod list;
pub mod remove;
pub mod setup;
pub mod start;
pub mod status;

#[derive(Parser)]
#[command(
    name = "mirrorsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Keep local folders mirrored to git repositories",
    long_about = "mirrorsync watches local folders and keeps each one in sync with a git \
                  repository: pull first, commit local changes, push. When both sides \
                  changed the same lines, the remote version wins."
)]
pub struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "MIRRORSYNC_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,

    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add or replace a sync pair
    Setup(setup::SetupArgs),
    /// Delete a sync pair from the configuration
    Remove(remove::RemoveArgs),
    /// List configured sync pairs
    List(list::ListArgs),
    /// Show sync and repository status for each pair
    Status(status::StatusArgs),
    /// Run the sync daemon until interrupted
    Start(start::StartArgs),
    /// Run one sync cycle for a single pair
    Test(test::TestArgs),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Logging settings come from the config when it is readable; commands
        // report a broken config themselves
        let global = SyncConfig::load(&self.config)
            .map(|c| c.global)
            .unwrap_or_else(|_| GlobalSettings::default());
        setup_logging(
            self.verbose,
            self.quiet,
            &global.log_level,
            global.log_file.as_deref(),
        )?;

        let output = Output::new(self.verbose > 0, self.quiet);

        match self.command {
            Commands::Setup(args) => setup::execute(args, &self.config, &output),
            Commands::Remove(args) => remove::execute(args, &self.config, &output),
            Commands::List(args) => list::execute(args, &self.config, &output),
            Commands::Status(args) => status::execute(args, &self.config, &output).await,
            Commands::Start(args) => start::execute(args, &self.config, &output).await,
            Commands::Test(args) => test::execute(args, &self.config, &output).await,
        }
    }
}
