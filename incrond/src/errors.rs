// src/errors.rs

//! Crate-wide error types.
//!
//! Core components return the structured [`IncronError`]; the application
//! wiring layer (`lib.rs`, the binaries) works with `anyhow` and attaches
//! context there.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IncronError {
    /// Startup-time failure (inotify handle, self-pipe, base directories).
    /// Always fatal.
    #[error("initialization failed: {0}")]
    Init(String),

    /// Configuration could not be loaded or is missing a required key.
    #[error("configuration error: {0}")]
    Config(String),

    /// A watch could not be registered with the kernel.
    #[error("cannot create watch for {path}: {source}")]
    WatchAdd {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Forking or executing a child command failed.
    #[error("cannot spawn process: {0}")]
    Spawn(std::io::Error),

    /// A command template tokenized to nothing.
    #[error("cannot prepare command arguments")]
    BadCommand,

    /// Unknown user name (not present in the user database).
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// Another daemon instance already holds the lockfile.
    #[error("an instance of the daemon is already running (pid {0})")]
    AlreadyRunning(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Kernel call failure outside the dedicated variants above.
    #[error("kernel error: {0}")]
    Kernel(#[from] nix::errno::Errno),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, IncronError>;
