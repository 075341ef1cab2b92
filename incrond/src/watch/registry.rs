// src/watch/registry.rs

use std::collections::{HashMap, VecDeque};
use std::ffi::OsString;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};

use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask};
use tracing::debug;

use crate::errors::{IncronError, Result};

/// Inotify read buffer size, large enough for a burst of events with
/// names.
const EVENT_BUFFER_SIZE: usize = 4096;

/// One live kernel registration.
#[derive(Debug, Clone)]
pub struct Watch {
    pub path: PathBuf,
    pub mask: u32,
    pub enabled: bool,
}

/// A typed event drained from the kernel.
///
/// `name` is the basename of the affected child when the event concerns
/// an entry inside a watched directory; `None` when it concerns the
/// watched path itself.
#[derive(Debug, Clone)]
pub struct RegistryEvent {
    pub wd: WatchDescriptor,
    pub mask: EventMask,
    pub cookie: u32,
    pub name: Option<OsString>,
}

impl RegistryEvent {
    pub fn is_type(&self, mask: EventMask) -> bool {
        self.mask.contains(mask)
    }

    /// The event name as UTF-8, or an empty string when absent.
    pub fn name_lossy(&self) -> String {
        self.name
            .as_ref()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// One inotify handle plus its descriptor → watch map and event queue.
///
/// Invariant: every descriptor in the map is currently registered with
/// the kernel; removal deregisters and deletes together.
pub struct WatchRegistry {
    inotify: Inotify,
    watches: HashMap<WatchDescriptor, Watch>,
    queue: VecDeque<RegistryEvent>,
    buffer: [u8; EVENT_BUFFER_SIZE],
}

impl WatchRegistry {
    /// Acquire a kernel notification handle. The handle is non-blocking
    /// and close-on-exec, so spawned children never inherit it.
    pub fn open() -> Result<Self> {
        let inotify = Inotify::init()
            .map_err(|e| IncronError::Init(format!("cannot create inotify handle: {e}")))?;

        Ok(Self {
            inotify,
            watches: HashMap::new(),
            queue: VecDeque::new(),
            buffer: [0; EVENT_BUFFER_SIZE],
        })
    }

    /// Register a path. Bits in `mask` without a kernel meaning at watch
    /// time are dropped before the call.
    pub fn add(&mut self, path: &Path, mask: u32) -> Result<WatchDescriptor> {
        let wd = self
            .inotify
            .watches()
            .add(path, WatchMask::from_bits_truncate(mask))
            .map_err(|source| IncronError::WatchAdd {
                path: path.to_path_buf(),
                source,
            })?;

        self.watches.insert(
            wd.clone(),
            Watch {
                path: path.to_path_buf(),
                mask,
                enabled: true,
            },
        );

        Ok(wd)
    }

    /// Deregister a watch. Idempotent: removing a watch the kernel has
    /// already dropped (e.g. after `IN_IGNORED`) is not an error.
    pub fn remove(&mut self, wd: &WatchDescriptor) {
        if self.watches.remove(wd).is_some() {
            if let Err(e) = self.inotify.watches().remove(wd.clone()) {
                debug!(error = %e, "watch already gone at kernel level");
            }
        }
    }

    /// Suspend or resume event delivery for a watch.
    ///
    /// The kernel registration is kept (the kernel refuses re-adding a
    /// path with an empty mask); instead, [`drain`] discards events of
    /// suspended watches. The descriptor stays stable and queued events
    /// of other watches are unaffected.
    ///
    /// [`drain`]: WatchRegistry::drain
    pub fn set_enabled(&mut self, wd: &WatchDescriptor, enabled: bool) -> Result<()> {
        if let Some(watch) = self.watches.get_mut(wd) {
            watch.enabled = enabled;
        }
        Ok(())
    }

    /// Read all currently available kernel events into the internal queue
    /// in one non-blocking pass.
    ///
    /// Events of suspended watches are dropped here, except for
    /// `IN_IGNORED` and `IN_Q_OVERFLOW`, which callers always see.
    pub fn drain(&mut self) -> Result<()> {
        loop {
            match self.inotify.read_events(&mut self.buffer) {
                Ok(events) => {
                    let mut any = false;
                    for event in events {
                        any = true;
                        let suspended = self
                            .watches
                            .get(&event.wd)
                            .is_some_and(|w| !w.enabled)
                            && !event.mask.contains(EventMask::IGNORED)
                            && !event.mask.contains(EventMask::Q_OVERFLOW);
                        if suspended {
                            continue;
                        }
                        self.queue.push_back(RegistryEvent {
                            wd: event.wd,
                            mask: event.mask,
                            cookie: event.cookie,
                            name: event.name.map(|n| n.to_os_string()),
                        });
                    }
                    if !any {
                        return Ok(());
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(IncronError::Io(e)),
            }
        }
    }

    /// Pop the next queued typed event.
    pub fn next_event(&mut self) -> Option<RegistryEvent> {
        self.queue.pop_front()
    }

    pub fn watch(&self, wd: &WatchDescriptor) -> Option<&Watch> {
        self.watches.get(wd)
    }

    /// Drop the map entry for a descriptor the kernel has already
    /// released (`IN_IGNORED`), without issuing another kernel call.
    pub fn forget(&mut self, wd: &WatchDescriptor) {
        self.watches.remove(wd);
    }

    /// Deregister every watch and clear pending events.
    pub fn clear(&mut self) {
        let wds: Vec<WatchDescriptor> = self.watches.keys().cloned().collect();
        for wd in wds {
            self.remove(&wd);
        }
        self.queue.clear();
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// The underlying descriptor for the outer poll loop.
    pub fn raw_fd(&self) -> RawFd {
        self.inotify.as_raw_fd()
    }

    /// Borrowed view of the descriptor, valid for the registry's
    /// lifetime.
    pub fn as_fd(&self) -> BorrowedFd<'_> {
        // SAFETY: the inotify handle is owned by `self` and stays open
        // for as long as the returned borrow.
        unsafe { BorrowedFd::borrow_raw(self.inotify.as_raw_fd()) }
    }
}
