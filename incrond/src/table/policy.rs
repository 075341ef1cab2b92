// src/table/policy.rs

//! Allow/deny authorization files.
//!
//! - If the allow file exists, a user is permitted iff listed in it.
//! - Otherwise, if the deny file exists, a user is permitted iff NOT
//!   listed in it.
//! - If neither exists, everybody is permitted.

use std::fs;
use std::path::Path;

use nix::unistd::User;

use crate::config::Config;

/// Check the allow/deny policy for a user name.
pub fn user_allowed(cfg: &Config, user: &str) -> bool {
    if let Some(allowed) = read_names(&cfg.allowed_users) {
        return allowed.iter().any(|n| n == user);
    }

    if let Some(denied) = read_names(&cfg.denied_users) {
        return !denied.iter().any(|n| n == user);
    }

    true
}

/// Full authorization check used by the daemon: the user must exist in
/// the user database AND pass the allow/deny policy.
pub fn check_user(cfg: &Config, user: &str) -> bool {
    match User::from_name(user) {
        Ok(Some(_)) => user_allowed(cfg, user),
        _ => false,
    }
}

/// Read one name per line; surrounding whitespace is ignored.
/// Returns `None` when the file does not exist or cannot be read.
fn read_names(path: &Path) -> Option<Vec<String>> {
    let contents = fs::read_to_string(path).ok()?;
    Some(
        contents
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect(),
    )
}
