// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

/// Command-line arguments for `incrontab`.
///
/// Exactly one operation must be given: one of the flags below or a
/// single file to import (`-` reads standard input).
#[derive(Debug, Clone, Parser)]
#[command(
    name = "incrontab",
    version,
    about = "inotify cron table manipulator.",
    long_about = None,
    group(ArgGroup::new("operation").required(true))
)]
pub struct CliArgs {
    /// List the user table.
    #[arg(short = 'l', long, group = "operation")]
    pub list: bool,

    /// Remove the user table.
    #[arg(short = 'r', long, group = "operation")]
    pub remove: bool,

    /// Edit the user table.
    #[arg(short = 'e', long, group = "operation")]
    pub edit: bool,

    /// List supported event types.
    #[arg(short = 't', long, group = "operation")]
    pub types: bool,

    /// Request the daemon to reload the user table.
    #[arg(short = 'd', long, group = "operation")]
    pub reload: bool,

    /// Import a table from this file (`-` = standard input).
    #[arg(value_name = "FILE", group = "operation")]
    pub import: Option<PathBuf>,

    /// Operate on another user's table (requires root privileges).
    #[arg(short = 'u', long, value_name = "USER")]
    pub user: Option<String>,

    /// Override the configuration file path (requires root privileges).
    #[arg(short = 'f', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print short program information and exit.
    #[arg(long, group = "operation")]
    pub about: bool,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
