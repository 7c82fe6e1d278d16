//! Command-line interface for mirrorsync
//!
//! clap parses the arguments; each subcommand lives in [`commands`] and writes
//! user-facing results through [`Output`].

pub mod commands;
pub mod output;

pub use commands::Cli;
pub use output::Output;
