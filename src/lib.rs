//! # mirrorsync - keep local folders mirrored to git repositories
//!
//! Each configured *sync pair* binds a local folder to a remote branch. A
//! per-pair scheduler runs pull → commit → push cycles on a timer and whenever
//! the folder changes, with the remote winning any conflict.
//!
//! ## Quick Start
//!
//! ```bash
//! # Register a folder
//! mirrorsync setup notes ~/notes me/notes GITHUB_TOKEN
//!
//! # Sync it once to check credentials and the remote
//! mirrorsync test notes
//!
//! # Keep every pair in sync until interrupted
//! mirrorsync start
//! ```

pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod git;
pub mod logging;
pub mod shared;
pub mod sync;
pub mod watch;

pub use cli::{Cli, Output};
pub use config::{GlobalSettings, SyncConfig, SyncPair};
pub use error::{SyncError, SyncResult};
pub use sync::Orchestrator;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
