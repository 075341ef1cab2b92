// src/exec/supervisor.rs

//! Child process supervision.
//!
//! Commands run as separate OS processes. For user tables the child
//! switches group, supplementary groups and user (in that order) before
//! exec and gets a sanitized environment; system tables run under the
//! daemon's own identity. Finished children are reaped in one
//! non-blocking pass and their completion actions handed back to the
//! dispatcher.

use std::collections::HashMap;
use std::ffi::CString;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use inotify::WatchDescriptor;
use nix::unistd::{initgroups, setgid, setuid, User};
use tracing::{debug, warn};

use crate::errors::{IncronError, Result};

/// `PATH` given to commands running under a user identity.
pub const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/X11R6/bin";

/// Identity a command runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// System tables: keep the daemon's uid/gid and environment.
    Daemon,
    /// User tables: switch to this user before exec.
    User(String),
}

/// What to do when a child finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionAction {
    /// Re-enable the watch that was suspended for loop avoidance.
    ReenableWatch {
        table: PathBuf,
        wd: WatchDescriptor,
    },
    Nothing,
}

struct ChildRecord {
    child: Child,
    action: CompletionAction,
}

/// Live-child bookkeeping: pid → child handle + completion action.
///
/// Touched only from the dispatcher loop, so no locking is involved.
#[derive(Default)]
pub struct ChildSupervisor {
    children: HashMap<u32, ChildRecord>,
}

impl ChildSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fork and exec `argv` under the given identity.
    ///
    /// The first element is the program (resolved via `PATH`), the rest
    /// its arguments; no shell is involved. On success the child is
    /// recorded together with its completion action.
    pub fn spawn(
        &mut self,
        argv: &[String],
        identity: &Identity,
        action: CompletionAction,
    ) -> Result<u32> {
        let program = argv.first().ok_or(IncronError::BadCommand)?;
        let mut cmd = Command::new(program);
        cmd.args(&argv[1..]);

        if let Identity::User(name) = identity {
            let user = User::from_name(name)
                .map_err(IncronError::Kernel)?
                .ok_or_else(|| IncronError::UnknownUser(name.clone()))?;

            // Root keeps the daemon environment; everyone else gets a
            // minimal, well-defined one.
            if !user.uid.is_root() {
                cmd.env_clear()
                    .env("LOGNAME", &user.name)
                    .env("USER", &user.name)
                    .env("USERNAME", &user.name)
                    .env("HOME", &user.dir)
                    .env("SHELL", &user.shell)
                    .env("PATH", DEFAULT_PATH);
            }

            let uid = user.uid;
            let gid = user.gid;
            let cname = CString::new(user.name.as_str())
                .map_err(|_| IncronError::UnknownUser(name.clone()))?;

            // The gid must change before initgroups, and both before the
            // uid drop, or the supplementary group set is lost.
            unsafe {
                cmd.pre_exec(move || {
                    setgid(gid).map_err(errno_to_io)?;
                    initgroups(&cname, gid).map_err(errno_to_io)?;
                    setuid(uid).map_err(errno_to_io)?;
                    Ok(())
                });
            }
        }

        let child = cmd.spawn().map_err(IncronError::Spawn)?;
        let pid = child.id();
        debug!(pid, program = %program, "child spawned");

        self.children.insert(pid, ChildRecord { child, action });
        Ok(pid)
    }

    /// Reap every finished child in one non-blocking pass and return
    /// their completion actions for the dispatcher to apply.
    pub fn reap_all(&mut self) -> Vec<CompletionAction> {
        let mut finished = Vec::new();

        for (pid, record) in self.children.iter_mut() {
            match record.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(pid, %status, "child finished");
                    finished.push(*pid);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(pid, error = %e, "cannot wait for child, dropping record");
                    finished.push(*pid);
                }
            }
        }

        let mut actions = Vec::with_capacity(finished.len());
        for pid in finished {
            if let Some(record) = self.children.remove(&pid) {
                actions.push(record.action);
            }
        }
        actions
    }

    /// Neutralize completion actions referring to a disposed table so a
    /// later reap cannot touch watches that no longer exist. The children
    /// themselves keep running and are still reaped normally.
    pub fn forget_table(&mut self, table: &Path) {
        for record in self.children.values_mut() {
            if matches!(&record.action, CompletionAction::ReenableWatch { table: t, .. } if t == table)
            {
                record.action = CompletionAction::Nothing;
            }
        }
    }

    pub fn live_count(&self) -> usize {
        self.children.len()
    }
}

fn errno_to_io(e: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(e as i32)
}
