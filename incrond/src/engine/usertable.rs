// src/engine/usertable.rs

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use inotify::{EventMask, WatchDescriptor};
use nix::unistd::{Gid, Group, User};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::errors::Result;
use crate::exec::supervisor::{ChildSupervisor, CompletionAction, Identity};
use crate::exec::{expand_command, tokenize, EventContext};
use crate::table::masks::IN_DONT_FOLLOW;
use crate::table::{Entry, Table};
use crate::watch::{RegistryEvent, WatchRegistry};

/// Runtime binding of one rule table to one watch registry for exactly
/// one principal. The table file's absolute path is the table's identity.
pub struct UserTable {
    user: String,
    system: bool,
    table_path: PathBuf,
    registry: WatchRegistry,
    rules: Vec<Entry>,
    rule_for: HashMap<WatchDescriptor, usize>,
}

impl UserTable {
    /// Create an empty table with its own kernel handle. Call [`load`]
    /// afterwards to read the table file and register the watches.
    ///
    /// [`load`]: UserTable::load
    pub fn new(user: impl Into<String>, system: bool, table_path: PathBuf) -> Result<Self> {
        Ok(Self {
            user: user.into(),
            system,
            table_path,
            registry: WatchRegistry::open()?,
            rules: Vec::new(),
            rule_for: HashMap::new(),
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn is_system(&self) -> bool {
        self.system
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    /// Read the table file and register a watch per rule.
    ///
    /// A rule whose path cannot be watched is dropped with a log entry;
    /// loading continues. Unless a rule opts out with `recursive=false`,
    /// every subdirectory existing under its path right now gets a watch
    /// with the same mask and command (one-time expansion; directories
    /// created later are not picked up until the next reload).
    pub fn load(&mut self, supervisor: &mut ChildSupervisor) {
        self.dispose(supervisor);

        let table = match Table::load(&self.table_path) {
            Ok(table) => table,
            Err(e) => {
                warn!(
                    table = %self.table_path.display(),
                    error = %e,
                    "cannot read table file"
                );
                return;
            }
        };

        for entry in table.entries() {
            let index = self.rules.len();
            self.rules.push(entry.clone());

            // warning only - permissions may change later
            let no_follow = entry.mask & IN_DONT_FOLLOW != 0;
            if !self.system && !may_access(&self.user, &entry.path, no_follow) {
                warn!(
                    path = %entry.path.display(),
                    "access denied on watched path - events will be discarded silently"
                );
            }

            if let Err(e) = self.add_watch(&entry.path, entry.mask, index) {
                if self.system {
                    error!(table = %self.user, error = %e, "cannot create watch for system table");
                } else {
                    error!(user = %self.user, error = %e, "cannot create watch for user");
                }
                continue;
            }

            if !entry.no_recursion {
                self.add_subdirectory_watches(index);
            }
        }
    }

    /// Register watches for every subdirectory below the rule's path.
    fn add_subdirectory_watches(&mut self, index: usize) {
        let (root, mask) = {
            let rule = &self.rules[index];
            (rule.path.clone(), rule.mask)
        };
        if !root.is_dir() {
            return;
        }

        let walker = WalkDir::new(&root).min_depth(1).into_iter();
        for dir_entry in walker.filter_map(|e| e.ok()) {
            if !dir_entry.file_type().is_dir() {
                continue;
            }
            if let Err(e) = self.add_watch(dir_entry.path(), mask, index) {
                warn!(
                    path = %dir_entry.path().display(),
                    error = %e,
                    "cannot watch subdirectory"
                );
            }
        }
    }

    fn add_watch(&mut self, path: &Path, mask: u32, index: usize) -> Result<()> {
        let wd = self.registry.add(path, mask)?;
        self.rule_for.insert(wd, index);
        Ok(())
    }

    /// Remove every watch and forget the rules. Completion actions of
    /// children spawned from this table are neutralized so a later reap
    /// cannot re-enable watches that no longer exist.
    pub fn dispose(&mut self, supervisor: &mut ChildSupervisor) {
        supervisor.forget_table(&self.table_path);
        self.registry.clear();
        self.rule_for.clear();
        self.rules.clear();
    }

    /// Drain the registry and handle every queued event. Errors are
    /// contained per event.
    pub fn process_events(&mut self, supervisor: &mut ChildSupervisor) {
        if let Err(e) = self.registry.drain() {
            error!(user = %self.user, error = %e, "cannot read events");
            return;
        }
        while let Some(event) = self.registry.next_event() {
            self.on_event(event, supervisor);
        }
    }

    /// Re-enable a watch after the child that suspended it finished.
    pub fn reenable_watch(&mut self, wd: &WatchDescriptor) {
        if let Err(e) = self.registry.set_enabled(wd, true) {
            error!(user = %self.user, error = %e, "cannot re-enable watch");
        }
    }

    fn on_event(&mut self, event: RegistryEvent, supervisor: &mut ChildSupervisor) {
        if event.is_type(EventMask::Q_OVERFLOW) {
            warn!(
                user = %self.user,
                "inotify event queue overflowed, events may have been lost"
            );
            return;
        }
        if event.is_type(EventMask::IGNORED) {
            // kernel already dropped the watch (deleted/unmounted path)
            self.registry.forget(&event.wd);
            self.rule_for.remove(&event.wd);
            return;
        }

        let (watch_path, enabled) = match self.registry.watch(&event.wd) {
            Some(watch) => (watch.path.clone(), watch.enabled),
            None => return,
        };
        if !enabled {
            // stale event queued before the watch was suspended
            return;
        }
        let rule = match self.rule_for.get(&event.wd).map(|i| self.rules[*i].clone()) {
            Some(rule) => rule,
            None => return,
        };

        // discard events the principal has no rights for
        let no_follow = rule.mask & IN_DONT_FOLLOW != 0;
        if !self.system && !may_access(&self.user, &watch_path, no_follow) {
            return;
        }

        let name = event.name_lossy();
        let ctx = EventContext {
            watch_path: &watch_path,
            name: &name,
            mask: event.mask.bits(),
        };
        let cmd = expand_command(&rule.cmd, &ctx);
        let argv = match tokenize(&cmd) {
            Ok(argv) => argv,
            Err(e) => {
                error!(user = %self.user, error = %e, "cannot prepare command arguments");
                return;
            }
        };

        if self.system {
            info!(table = %self.user, cmd = %cmd, "(system) CMD");
        } else {
            info!(user = %self.user, cmd = %cmd, "CMD");
        }

        let action = if rule.no_loop {
            if let Err(e) = self.registry.set_enabled(&event.wd, false) {
                error!(user = %self.user, error = %e, "cannot suspend watch");
            }
            CompletionAction::ReenableWatch {
                table: self.table_path.clone(),
                wd: event.wd.clone(),
            }
        } else {
            CompletionAction::Nothing
        };

        let identity = if self.system {
            Identity::Daemon
        } else {
            Identity::User(self.user.clone())
        };

        if let Err(e) = supervisor.spawn(&argv, &identity, action) {
            error!(user = %self.user, error = %e, "cannot run command");
            if rule.no_loop {
                self.reenable_watch(&event.wd);
            }
        }
    }
}

/// Check whether `user` may access `path`, using the same rules the
/// kernel applies for rwx permission groups:
///
/// - anybody may access a world-accessible file,
/// - root may access anything,
/// - group permission applies when the file's group is the user's
///   primary group or lists the user as a member,
/// - owner permission applies when the file belongs to the user.
pub fn may_access(user: &str, path: &Path, no_follow: bool) -> bool {
    let meta = if no_follow {
        fs::symlink_metadata(path)
    } else {
        fs::metadata(path)
    };
    let meta = match meta {
        Ok(meta) => meta,
        Err(_) => return false,
    };
    let mode = meta.mode();

    // accessible to everyone
    if mode & 0o007 != 0 {
        return true;
    }

    let pwd = match User::from_name(user) {
        Ok(Some(pwd)) => pwd,
        _ => return false,
    };

    if pwd.uid.is_root() {
        return true;
    }

    // accessible to the file's group
    if mode & 0o070 != 0 {
        if pwd.gid.as_raw() == meta.gid() {
            return true;
        }
        if let Ok(Some(group)) = Group::from_gid(Gid::from_raw(meta.gid())) {
            if group.mem.iter().any(|m| m == user) {
                return true;
            }
        }
    }

    // accessible to the owner
    if mode & 0o700 != 0 && pwd.uid.as_raw() == meta.uid() {
        return true;
    }

    false
}
