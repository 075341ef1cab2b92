// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `incrond`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "incrond",
    version,
    about = "inotify cron daemon - runs commands in response to filesystem events.",
    long_about = None
)]
pub struct CliArgs {
    /// Run in the foreground, do not detach from the terminal.
    #[arg(short = 'n', long)]
    pub foreground: bool,

    /// Terminate a running daemon instance and exit.
    #[arg(short = 'k', long)]
    pub kill: bool,

    /// Override the configuration file path (requires root).
    #[arg(short = 'f', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print short program information and exit.
    #[arg(long)]
    pub about: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `INCROND_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
