use anyhow::Result;
use clap::Args;
use std::path::Path;

use crate::cli::Output;
use crate::config::SyncConfig;

#[derive(Args)]
pub struct ListArgs {
    /// Print pair names only
    #[arg(long)]
    pub names: bool,
}

pub fn execute(args: ListArgs, config_path: &Path, output: &Output) -> Result<()> {
    let config = SyncConfig::load(config_path)?;

    if config.sync_pairs.is_empty() {
        output.info("No sync pairs configured. Add one with `mirrorsync setup`.");
        return Ok(());
    }

    if args.names {
        for pair in &config.sync_pairs {
            println!("{}", pair.name);
        }
        return Ok(());
    }

    output.count("≡", "Sync pairs", config.sync_pairs.len());
    for pair in &config.sync_pairs {
        output.header(&pair.name);
        output.table_row("Local folder", &pair.local_path.display().to_string());
        output.table_row("Remote", &pair.remote_ref);
        output.table_row("Branch", &pair.branch);
        output.table_row(
            "Interval",
            &format!("{}s", pair.interval(&config.global).as_secs()),
        );
        if let Some(credential) = &pair.credential_ref {
            output.table_row("Credential", credential);
        }
        output.table_row("Commit message", &pair.commit_message_template);
        if !pair.ignore_patterns.is_empty() {
            output.table_row("Ignored", "");
            for pattern in &pair.ignore_patterns {
                output.list_item(pattern);
            }
        }
    }
    output.blank_line();

    Ok(())
}
