// src/config/model.rs

use std::path::PathBuf;

/// Typed configuration with built-in defaults.
///
/// Every key can be overridden from the configuration file:
///
/// ```text
/// system_table_dir = /etc/incron.d
/// user_table_dir = /var/spool/incron
/// allowed_users = /etc/incron.allow
/// denied_users = /etc/incron.deny
/// lockfile_dir = /var/run
/// lockfile_name = incrond
/// editor =
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding system tables (one file per table, any name).
    pub system_table_dir: PathBuf,

    /// Directory holding user tables (file name = user name).
    pub user_table_dir: PathBuf,

    /// Allow file; when present only listed users may use the system.
    pub allowed_users: PathBuf,

    /// Deny file; consulted only when the allow file is absent.
    pub denied_users: PathBuf,

    pub lockfile_dir: PathBuf,
    pub lockfile_name: String,

    /// Preferred editor for `incrontab --edit`; empty means "fall through
    /// to `$EDITOR`, `$VISUAL`, /etc/alternatives/editor, vim".
    pub editor: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            system_table_dir: PathBuf::from("/etc/incron.d"),
            user_table_dir: PathBuf::from("/var/spool/incron"),
            allowed_users: PathBuf::from("/etc/incron.allow"),
            denied_users: PathBuf::from("/etc/incron.deny"),
            lockfile_dir: PathBuf::from("/var/run"),
            lockfile_name: "incrond".to_string(),
            editor: String::new(),
        }
    }
}

impl Config {
    /// Path of the table for the given user.
    pub fn user_table_path(&self, user: &str) -> PathBuf {
        self.user_table_dir.join(user)
    }

    /// Path of the system table with the given name.
    pub fn system_table_path(&self, name: &str) -> PathBuf {
        self.system_table_dir.join(name)
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.lockfile_dir
            .join(format!("{}.pid", self.lockfile_name))
    }

    /// Apply one `key = value` pair. Unknown keys are ignored so newer
    /// configuration files keep working with older daemons.
    pub(crate) fn set(&mut self, key: &str, value: &str) {
        match key {
            "system_table_dir" => self.system_table_dir = PathBuf::from(value),
            "user_table_dir" => self.user_table_dir = PathBuf::from(value),
            "allowed_users" => self.allowed_users = PathBuf::from(value),
            "denied_users" => self.denied_users = PathBuf::from(value),
            "lockfile_dir" => self.lockfile_dir = PathBuf::from(value),
            "lockfile_name" => self.lockfile_name = value.to_string(),
            "editor" => self.editor = value.to_string(),
            _ => {}
        }
    }
}
