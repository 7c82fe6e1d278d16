use anyhow::{Result, bail};
use clap::Args;
use std::path::{Path, PathBuf};

use crate::cli::Output;
use crate::config::registry::{paths_overlap, validate_pair};
use crate::config::{SyncConfig, SyncPair};
use crate::credentials::{CredentialResolver, EnvCredentials, env_var_name};

#[derive(Args)]
pub struct SetupArgs {
    /// Unique name for the pair
    pub name: String,

    /// Local folder to mirror (created if missing)
    pub local_path: PathBuf,

    /// Remote repository: owner/repo, a git URL, or a path
    pub remote_ref: String,

    /// Environment variable holding the access token
    pub credential_ref: Option<String>,

    /// Seconds between timer-driven syncs (defaults to global sync_interval)
    #[arg(short = 'i', long)]
    pub autocommit_interval: Option<u64>,

    /// Branch to track
    #[arg(short, long, default_value = "main")]
    pub branch: String,

    /// Commit message template; supports {timestamp} and {pair}
    #[arg(long)]
    pub commit_template: Option<String>,

    /// Glob patterns to leave out of syncs (comma-separated or repeated)
    #[arg(long, value_delimiter = ',')]
    pub ignore: Vec<String>,

    /// Replace an existing pair with the same name
    #[arg(short, long)]
    pub force: bool,
}

pub fn execute(args: SetupArgs, config_path: &Path, output: &Output) -> Result<()> {
    let mut config = SyncConfig::read_file(config_path)?;

    let mut pair = SyncPair::new(&args.name, args.local_path, args.remote_ref);
    pair.credential_ref = args.credential_ref;
    pair.branch = args.branch;
    pair.autocommit_interval = args.autocommit_interval;
    pair.ignore_patterns = args.ignore;
    if let Some(template) = args.commit_template {
        pair.commit_message_template = template;
    }

    let validated = validate_pair(&pair, &config.global)?;
    pair.name = validated.name.clone();
    pair.local_path = validated.local_path.clone();

    if let Some(other) = config.sync_pairs.iter().find(|p| {
        p.name != pair.name && overlapping(&p.local_path, &pair.local_path)
    }) {
        bail!(
            "{} overlaps {}, already mirrored by sync pair '{}'",
            pair.local_path.display(),
            other.local_path.display(),
            other.name
        );
    }

    let credential = pair.credential_ref.clone();
    let name = pair.name.clone();
    let local = pair.local_path.clone();
    config.upsert_pair(pair, args.force)?;
    config.save_to_file(config_path)?;

    output.success(&format!(
        "Sync pair '{}' saved to {}",
        name,
        config_path.display()
    ));
    output.verbose(&format!("Local folder: {}", local.display()));

    if let Some(reference) = credential
        && EnvCredentials.resolve(&reference).is_err()
    {
        output.warning(&format!(
            "Environment variable {} is not set; syncs for '{}' will fail until it is",
            env_var_name(&reference),
            name
        ));
    }

    Ok(())
}

fn overlapping(a: &Path, b: &Path) -> bool {
    let a = a.canonicalize().unwrap_or_else(|_| a.to_path_buf());
    let b = b.canonicalize().unwrap_or_else(|_| b.to_path_buf());
    paths_overlap(&a, &b)
}
