// src/main.rs

mod cli;
mod ops;

use anyhow::{bail, Result};
use nix::unistd::{geteuid, getuid, User};

use incrond::config::{self, Config};
use incrond::table::policy;

use crate::cli::CliArgs;

fn main() {
    let args = cli::parse();

    if args.about {
        println!(
            "incrontab - inotify cron table manipulator {}",
            env!("CARGO_PKG_VERSION")
        );
        return;
    }

    if let Err(err) = run(args) {
        eprintln!("incrontab error: {err:?}");
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    let cfg = load_config(&args)?;

    // --types needs no user context
    if args.types {
        ops::list_types();
        return Ok(());
    }

    let user = determine_user(&args)?;
    if !policy::user_allowed(&cfg, &user) {
        bail!("user '{user}' is not allowed to use incron");
    }

    if args.list {
        ops::list_table(&cfg, &user)
    } else if args.remove {
        ops::remove_table(&cfg, &user)
    } else if args.edit {
        ops::edit_table(&cfg, &user)
    } else if args.reload {
        ops::reload_table(&cfg, &user)
    } else if let Some(file) = &args.import {
        ops::import_table(&cfg, &user, file)
    } else {
        bail!("no operation given; see --help");
    }
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

/// The user whose table is manipulated: `--user` (root only) or the
/// invoking user.
fn determine_user(args: &CliArgs) -> Result<String> {
    if let Some(user) = &args.user {
        if !geteuid().is_root() {
            bail!("only root may operate on other users' tables");
        }
        if !matches!(User::from_name(user), Ok(Some(_))) {
            bail!("cannot find user '{user}'");
        }
        return Ok(user.clone());
    }

    match User::from_uid(getuid()) {
        Ok(Some(pwd)) => Ok(pwd.name),
        _ => bail!("cannot determine the invoking user"),
    }
}
