// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod lockfile;
pub mod logging;
pub mod table;
pub mod watch;

use anyhow::{bail, Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{daemon, geteuid, Pid};
use tracing::info;

use crate::cli::CliArgs;
use crate::config::Config;
use crate::engine::EventDispatcher;
use crate::lockfile::AppLock;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the `--kill` shortcut
/// - management + user table setup
/// - daemonization, the pidfile lock and signal handlers
/// - the dispatcher loop
pub fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(&args)?;

    if args.kill {
        return kill_running_instance(&cfg);
    }

    info!("starting service (version {})", env!("CARGO_PKG_VERSION"));

    let mut dispatcher = EventDispatcher::new(cfg.clone())?;
    dispatcher.load_tables()?;

    if !args.foreground {
        daemon(false, false).context("cannot detach from the terminal")?;
    }

    // locked only after daemonizing so the recorded pid is the final one
    let _lock = AppLock::acquire(cfg.lockfile_path())?;

    dispatcher.install_signal_handlers()?;

    info!("ready for processing events");
    dispatcher.run()?;

    info!("stopping service");
    Ok(())
}

/// Load the configuration, honoring `--config` (root only).
fn load_config(args: &CliArgs) -> Result<Config> {
    match &args.config {
        Some(path) => {
            if !geteuid().is_root() {
                bail!("overriding the configuration file requires root privileges");
            }
            config::load(path)
        }
        None => config::load_default(),
    }
}

/// `--kill`: signal the instance recorded in the lockfile.
fn kill_running_instance(cfg: &Config) -> Result<()> {
    let path = cfg.lockfile_path();
    let pid = lockfile::read_pid(&path)
        .with_context(|| format!("no running instance found via {}", path.display()))?;

    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .with_context(|| format!("cannot terminate instance with pid {pid}"))?;
    Ok(())
}
