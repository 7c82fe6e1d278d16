//! Console output for mirrorsync commands
//!
//! Styled messages and symbols shared by every subcommand. Diagnostics go through
//! `tracing`; this is only for what the user asked to see.

use console::style;

use crate::sync::SyncStatus;

/// Output handler for consistent CLI formatting
pub struct Output {
    verbose: bool,
    quiet: bool,
}

impl Output {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self { verbose, quiet }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("✔").green(), message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("⚠").yellow(), message);
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("ℹ").blue(), message);
        }
    }

    /// Print a verbose message (only if verbose mode is enabled)
    pub fn verbose(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("{} {}", style("ℹ").dim(), style(message).dim());
        }
    }

    pub fn header(&self, title: &str) {
        if !self.quiet {
            println!("\n{}", style(title).bold().underlined());
        }
    }

    /// Print a step in a process
    pub fn step(&self, step: &str) {
        if !self.quiet {
            println!("{} {}", style("❯").cyan(), step);
        }
    }

    /// Pair name with a colored status badge
    pub fn pair_heading(&self, name: &str, status: SyncStatus) {
        if self.quiet {
            return;
        }
        let badge = match status {
            SyncStatus::Idle => style(status.to_string()).green(),
            SyncStatus::Syncing => style(status.to_string()).cyan(),
            SyncStatus::Error => style(status.to_string()).red().bold(),
            SyncStatus::Disabled => style(status.to_string()).dim(),
        };
        println!("\n{} [{}]", style(name).bold(), badge);
    }

    /// Print a table row
    pub fn table_row(&self, key: &str, value: &str) {
        if !self.quiet {
            println!("  {:<20} {}", style(key).dim(), value);
        }
    }

    /// Print a list item
    pub fn list_item(&self, item: &str) {
        if !self.quiet {
            println!("  • {}", item);
        }
    }

    pub fn blank_line(&self) {
        if !self.quiet {
            println!();
        }
    }

    /// Print a count/summary with enhanced styling
    pub fn count(&self, icon: &str, message: &str, count: usize) {
        if !self.quiet {
            println!(
                "{} {} {}",
                style(icon).cyan().bold(),
                style(message).bold(),
                style(format!("({})", count)).dim()
            );
        }
    }
}
