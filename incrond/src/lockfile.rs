// src/lockfile.rs

//! Single-instance pidfile locking.
//!
//! The lock is a `<lockfile_dir>/<name>.pid` file created with
//! `O_CREAT|O_EXCL` and holding the daemon's pid. A leftover file from a
//! crashed instance is detected by probing the recorded pid and removed.

use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::debug;

use crate::errors::{IncronError, Result};

/// How often to retry the create/probe/unlink cycle before giving up.
const LOCK_ATTEMPTS: u32 = 100;

/// Held for the daemon's lifetime; releasing (or dropping) removes the
/// pidfile.
#[derive(Debug)]
pub struct AppLock {
    path: PathBuf,
    locked: bool,
}

impl AppLock {
    /// Acquire the lock, failing with [`IncronError::AlreadyRunning`]
    /// when a live process holds it.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        for _ in 0..LOCK_ATTEMPTS {
            if try_create(&path)? {
                return Ok(Self { path, locked: true });
            }

            match read_pid(&path) {
                // lost the race with an unlink, try creating again
                Err(IncronError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
                Ok(pid) => match kill(Pid::from_raw(pid as i32), None) {
                    Ok(()) => return Err(IncronError::AlreadyRunning(pid)),
                    Err(Errno::ESRCH) => {
                        debug!(pid, "removing stale lockfile");
                        match fs::remove_file(&path) {
                            Ok(()) => {}
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                            Err(e) => return Err(e.into()),
                        }
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        }

        Err(IncronError::Init(format!(
            "cannot acquire lockfile {}",
            path.display()
        )))
    }

    /// Remove the pidfile. Safe to call more than once.
    pub fn release(&mut self) {
        if self.locked {
            let _ = fs::remove_file(&self.path);
            self.locked = false;
        }
    }
}

impl Drop for AppLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// `O_CREAT|O_EXCL` create; `Ok(false)` when the file already exists.
fn try_create(path: &Path) -> Result<bool> {
    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o644)
        .open(path)
    {
        Ok(mut file) => {
            write!(file, "{}", std::process::id())?;
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Read the pid recorded in a lockfile.
pub fn read_pid(path: &Path) -> Result<u32> {
    let contents = fs::read_to_string(path)?;
    contents
        .trim()
        .parse::<u32>()
        .map_err(|_| IncronError::Init(format!("lockfile {} is corrupted", path.display())))
}
