use anyhow::{Result, bail};
use clap::Args;
use std::path::Path;

use crate::cli::Output;
use crate::config::SyncConfig;

#[derive(Args)]
pub struct RemoveArgs {
    /// Name of the pair to delete
    pub name: String,
}

/// Drops the pair from the configuration. The local folder and its repository
/// are left untouched.
pub fn execute(args: RemoveArgs, config_path: &Path, output: &Output) -> Result<()> {
    let mut config = SyncConfig::read_file(config_path)?;

    if config.remove_pair(&args.name).is_none() {
        bail!("Sync pair '{}' not found", args.name);
    }

    config.save_to_file(config_path)?;
    output.success(&format!("Removed sync pair '{}'", args.name));
    Ok(())
}
