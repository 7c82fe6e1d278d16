//! Tracing subscriber setup for the CLI

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter directive for the console, from `-v` count or the configured level
pub fn filter_directive(verbose: u8, configured: &str) -> String {
    let level = match verbose {
        0 => configured.trim().to_lowercase(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => return "trace".to_string(),
    };
    format!("{level},globset=warn,notify=warn")
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides everything else. With `log_file` set, a plain copy of the
/// same events is appended there even when the console is quiet.
pub fn setup_logging(
    verbose: u8,
    quiet: bool,
    configured: &str,
    log_file: Option<&Path>,
) -> Result<()> {
    let directive = filter_directive(verbose, configured);
    let make_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive))
    };

    let console = (!quiet).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(make_filter())
    });

    let file = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(handle))
                    .with_filter(make_filter()),
            )
        }
        None => None,
    };

    // A second init (e.g. from tests) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init();
    Ok(())
}
