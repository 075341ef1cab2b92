// src/engine/dispatcher.rs

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use inotify::{EventMask, WatchDescriptor};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd::pipe2;
use signal_hook::consts::{SIGCHLD, SIGINT, SIGTERM};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::errors::{IncronError, Result};
use crate::exec::supervisor::{ChildSupervisor, CompletionAction};
use crate::table::{masks, policy};
use crate::watch::WatchRegistry;

use super::usertable::UserTable;

/// Events the management registry subscribes to on the table
/// directories.
const MGMT_MASK: u32 = masks::IN_CREATE
    | masks::IN_CLOSE_WRITE
    | masks::IN_DELETE
    | masks::IN_MOVE
    | masks::IN_DELETE_SELF
    | masks::IN_UNMOUNT;

/// Back-off before retrying a resource-starved poll.
const RESOURCE_RETRY_DELAY: Duration = Duration::from_secs(3);

/// The top-level poll loop.
///
/// Owns the self-pipe that turns `SIGCHLD` into descriptor readiness,
/// the management registry watching the two table directories, and the
/// set of per-principal user tables. Everything runs on this single
/// thread; children are separate processes.
pub struct EventDispatcher {
    cfg: Config,
    shutdown: Arc<AtomicBool>,
    pipe_read: File,
    pipe_write: OwnedFd,
    mgmt: WatchRegistry,
    sys_wd: WatchDescriptor,
    user_wd: WatchDescriptor,
    /// Table file path → user table. BTreeMap keeps the poll visiting
    /// order stable across iterations.
    tables: BTreeMap<PathBuf, UserTable>,
    supervisor: ChildSupervisor,
}

impl EventDispatcher {
    /// Set up the self-pipe and the management registry. Fails fatally
    /// when the table directories cannot be watched.
    pub fn new(cfg: Config) -> Result<Self> {
        let (pipe_read, pipe_write) = pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC)
            .map_err(|e| IncronError::Init(format!("cannot create notification pipe: {e}")))?;

        let mut mgmt = WatchRegistry::open()?;
        let sys_wd = mgmt
            .add(&cfg.system_table_dir, MGMT_MASK)
            .map_err(|e| IncronError::Init(format!("cannot watch system table directory: {e}")))?;
        let user_wd = mgmt
            .add(&cfg.user_table_dir, MGMT_MASK)
            .map_err(|e| IncronError::Init(format!("cannot watch user table directory: {e}")))?;

        Ok(Self {
            cfg,
            shutdown: Arc::new(AtomicBool::new(false)),
            pipe_read: File::from(pipe_read),
            pipe_write,
            mgmt,
            sys_wd,
            user_wd,
            tables: BTreeMap::new(),
            supervisor: ChildSupervisor::new(),
        })
    }

    /// The cooperative shutdown flag; signal handlers and tests set it.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Number of currently loaded principals.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Register `SIGTERM`/`SIGINT` → shutdown flag and `SIGCHLD` → one
    /// byte on the self-pipe.
    pub fn install_signal_handlers(&self) -> Result<()> {
        signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown))?;
        signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown))?;
        signal_hook::low_level::pipe::register_raw(SIGCHLD, self.pipe_write.as_raw_fd())?;
        Ok(())
    }

    /// Initial scan of both table directories.
    pub fn load_tables(&mut self) -> Result<()> {
        info!("loading user tables");

        let sys_dir = self.cfg.system_table_dir.clone();
        for name in regular_file_names(&sys_dir)? {
            info!(table = %name, "loading system table");
            self.create_table(&name, true);
        }

        let user_dir = self.cfg.user_table_dir.clone();
        for name in regular_file_names(&user_dir)? {
            if policy::check_user(&self.cfg, &name) {
                info!(user = %name, "loading table for user");
                self.create_table(&name, false);
            } else {
                warn!(user = %name, "table for invalid user found (ignored)");
            }
        }

        Ok(())
    }

    fn create_table(&mut self, name: &str, system: bool) {
        let path = if system {
            self.cfg.system_table_path(name)
        } else {
            self.cfg.user_table_path(name)
        };

        match UserTable::new(name, system, path.clone()) {
            Ok(mut table) => {
                table.load(&mut self.supervisor);
                self.tables.insert(path, table);
            }
            Err(e) => {
                error!(table = %path.display(), error = %e, "cannot set up table");
            }
        }
    }

    /// Main loop. Returns once the shutdown flag is set; watches are
    /// unregistered before returning.
    ///
    /// Per-iteration ordering: child reaping first (so a finished
    /// child's loop lock is released before its re-triggered event is
    /// seen), then table management, then user events.
    pub fn run(&mut self) -> Result<()> {
        while !self.shutdown.load(Ordering::SeqCst) {
            let fired = match self.poll_once() {
                Ok(Some(fired)) => fired,
                Ok(None) => continue,
                Err(e) => {
                    self.cleanup();
                    return Err(e);
                }
            };

            if fired.pipe {
                self.drain_pipe();
                self.apply_completions();
            }

            if fired.mgmt {
                self.process_mgmt_events();
            }

            for key in fired.tables {
                if let Some(table) = self.tables.get_mut(&key) {
                    table.process_events(&mut self.supervisor);
                }
            }
        }

        self.cleanup();
        Ok(())
    }

    /// One blocking poll over {self-pipe, management registry, one
    /// descriptor per principal}. `Ok(None)` means "nothing to do,
    /// re-enter the loop" (signal interruption or resource back-off).
    fn poll_once(&mut self) -> Result<Option<Fired>> {
        let keys: Vec<PathBuf> = self.tables.keys().cloned().collect();

        let mut fds: Vec<PollFd> = Vec::with_capacity(2 + keys.len());
        fds.push(PollFd::new(self.pipe_read.as_fd(), PollFlags::POLLIN));
        fds.push(PollFd::new(self.mgmt.as_fd(), PollFlags::POLLIN));
        for key in &keys {
            let table = &self.tables[key];
            fds.push(PollFd::new(table.registry().as_fd(), PollFlags::POLLIN));
        }

        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(None),
            Err(Errno::EAGAIN) => {
                warn!("poll short on resources, retrying");
                std::thread::sleep(RESOURCE_RETRY_DELAY);
                return Ok(None);
            }
            Err(e) => {
                error!(error = %e, "polling failed");
                return Err(e.into());
            }
        }

        let readable =
            |fd: &PollFd| fd.revents().is_some_and(|r| r.contains(PollFlags::POLLIN));

        Ok(Some(Fired {
            pipe: readable(&fds[0]),
            mgmt: readable(&fds[1]),
            tables: keys
                .into_iter()
                .zip(fds[2..].iter())
                .filter(|(_, fd)| readable(fd))
                .map(|(key, _)| key)
                .collect(),
        }))
    }

    /// Empty the self-pipe so the next `SIGCHLD` wakes poll again.
    fn drain_pipe(&mut self) {
        let mut buf = [0u8; 32];
        loop {
            match self.pipe_read.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "cannot drain notification pipe");
                    break;
                }
            }
        }
    }

    /// Reap finished children and release their loop locks.
    fn apply_completions(&mut self) {
        for action in self.supervisor.reap_all() {
            if let CompletionAction::ReenableWatch { table, wd } = action {
                if let Some(table) = self.tables.get_mut(&table) {
                    table.reenable_watch(&wd);
                }
            }
        }
    }

    /// Consume events from the management registry: table files created,
    /// rewritten, moved or deleted, and destruction of the base
    /// directories themselves.
    fn process_mgmt_events(&mut self) {
        if let Err(e) = self.mgmt.drain() {
            error!(error = %e, "cannot read management events");
            return;
        }

        while let Some(event) = self.mgmt.next_event() {
            if event.is_type(EventMask::Q_OVERFLOW) {
                warn!("management event queue overflowed");
                continue;
            }

            let system = event.wd == self.sys_wd;
            if !system && event.wd != self.user_wd {
                continue;
            }

            if event.is_type(EventMask::DELETE_SELF) || event.is_type(EventMask::UNMOUNT) {
                error!("base directory destroyed, exiting");
                self.shutdown.store(true, Ordering::SeqCst);
                continue;
            }

            let name = event.name_lossy();
            if name.is_empty() || name.starts_with('.') {
                continue;
            }

            let table_path = if system {
                self.cfg.system_table_path(&name)
            } else {
                self.cfg.user_table_path(&name)
            };
            let loaded = self.tables.contains_key(&table_path);

            if event.is_type(EventMask::CLOSE_WRITE) || event.is_type(EventMask::MOVED_TO) {
                if loaded {
                    if system {
                        info!(table = %name, "system table changed, reloading");
                    } else {
                        info!(user = %name, "table for user changed, reloading");
                    }
                    if let Some(table) = self.tables.get_mut(&table_path) {
                        table.load(&mut self.supervisor);
                    }
                } else if system {
                    info!(table = %name, "system table created, loading");
                    self.create_table(&name, true);
                } else if policy::check_user(&self.cfg, &name) {
                    info!(user = %name, "table for user created, loading");
                    self.create_table(&name, false);
                } else {
                    warn!(user = %name, "table for invalid user found (ignored)");
                }
            } else if event.is_type(EventMask::MOVED_FROM) || event.is_type(EventMask::DELETE) {
                if loaded {
                    if system {
                        info!(table = %name, "system table destroyed, removing");
                    } else {
                        info!(user = %name, "table for user destroyed, removing");
                    }
                    if let Some(mut table) = self.tables.remove(&table_path) {
                        table.dispose(&mut self.supervisor);
                    }
                }
            }
        }
    }

    /// Unregister every watch before leaving the loop. Children keep
    /// running; init will reap them.
    fn cleanup(&mut self) {
        let keys: Vec<PathBuf> = self.tables.keys().cloned().collect();
        for key in keys {
            if let Some(mut table) = self.tables.remove(&key) {
                table.dispose(&mut self.supervisor);
            }
        }
        self.mgmt.clear();
    }
}

/// Which poll slots reported readiness.
struct Fired {
    pipe: bool,
    mgmt: bool,
    tables: Vec<PathBuf>,
}

/// Names of regular, non-hidden files in a directory.
fn regular_file_names(dir: &std::path::Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| IncronError::Init(format!("cannot open table directory {}: {e}", dir.display())))?;

    let mut names = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            if !name.starts_with('.') {
                names.push(name);
            }
        }
    }
    names.sort();
    Ok(names)
}
