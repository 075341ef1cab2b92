// src/table/masks.rs

//! Symbolic event mask names.
//!
//! Rule masks are kept as raw `u32` bitsets so that tables may mix watch
//! bits (`IN_CLOSE_WRITE`) with event-only bits (`IN_ISDIR`) and decimal
//! literals, exactly as the table format allows. The [`inotify`] crate's
//! typed masks are reconstructed at the registry boundary.

use inotify::{EventMask, WatchMask};

pub const IN_ACCESS: u32 = WatchMask::ACCESS.bits();
pub const IN_MODIFY: u32 = WatchMask::MODIFY.bits();
pub const IN_ATTRIB: u32 = WatchMask::ATTRIB.bits();
pub const IN_CLOSE_WRITE: u32 = WatchMask::CLOSE_WRITE.bits();
pub const IN_CLOSE_NOWRITE: u32 = WatchMask::CLOSE_NOWRITE.bits();
pub const IN_OPEN: u32 = WatchMask::OPEN.bits();
pub const IN_MOVED_FROM: u32 = WatchMask::MOVED_FROM.bits();
pub const IN_MOVED_TO: u32 = WatchMask::MOVED_TO.bits();
pub const IN_CREATE: u32 = WatchMask::CREATE.bits();
pub const IN_DELETE: u32 = WatchMask::DELETE.bits();
pub const IN_DELETE_SELF: u32 = WatchMask::DELETE_SELF.bits();
pub const IN_UNMOUNT: u32 = EventMask::UNMOUNT.bits();
pub const IN_Q_OVERFLOW: u32 = EventMask::Q_OVERFLOW.bits();
pub const IN_IGNORED: u32 = EventMask::IGNORED.bits();
pub const IN_CLOSE: u32 = WatchMask::CLOSE.bits();
pub const IN_MOVE: u32 = WatchMask::MOVE.bits();
pub const IN_ISDIR: u32 = EventMask::ISDIR.bits();
pub const IN_DONT_FOLLOW: u32 = WatchMask::DONT_FOLLOW.bits();
pub const IN_ONESHOT: u32 = WatchMask::ONESHOT.bits();
pub const IN_ALL_EVENTS: u32 = WatchMask::ALL_EVENTS.bits();

/// Names accepted in the mask column, in the order they are dumped.
const NAMES: &[(&str, u32)] = &[
    ("IN_ACCESS", IN_ACCESS),
    ("IN_MODIFY", IN_MODIFY),
    ("IN_ATTRIB", IN_ATTRIB),
    ("IN_CLOSE_WRITE", IN_CLOSE_WRITE),
    ("IN_CLOSE_NOWRITE", IN_CLOSE_NOWRITE),
    ("IN_OPEN", IN_OPEN),
    ("IN_MOVED_FROM", IN_MOVED_FROM),
    ("IN_MOVED_TO", IN_MOVED_TO),
    ("IN_CREATE", IN_CREATE),
    ("IN_DELETE", IN_DELETE),
    ("IN_DELETE_SELF", IN_DELETE_SELF),
    ("IN_UNMOUNT", IN_UNMOUNT),
    ("IN_Q_OVERFLOW", IN_Q_OVERFLOW),
    ("IN_IGNORED", IN_IGNORED),
    ("IN_ISDIR", IN_ISDIR),
    ("IN_DONT_FOLLOW", IN_DONT_FOLLOW),
    ("IN_ONESHOT", IN_ONESHOT),
];

/// Combined names, accepted on input but expanded on output.
const COMBINED: &[(&str, u32)] = &[
    ("IN_ALL_EVENTS", IN_ALL_EVENTS),
    ("IN_CLOSE", IN_CLOSE),
    ("IN_MOVE", IN_MOVE),
];

/// Look up a single symbolic name. Returns `None` for unknown tokens.
pub fn bit_for_name(name: &str) -> Option<u32> {
    NAMES
        .iter()
        .chain(COMBINED.iter())
        .find(|(n, _)| *n == name)
        .map(|(_, bit)| *bit)
}

/// Render a mask as a comma-separated list of symbolic names.
///
/// A mask covering all of `IN_ALL_EVENTS` collapses to that single name;
/// otherwise each set bit with a name is listed individually. Returns an
/// empty string for a mask with no named bits.
pub fn dump(mask: u32) -> String {
    if mask & IN_ALL_EVENTS == IN_ALL_EVENTS {
        return "IN_ALL_EVENTS".to_string();
    }

    let mut out = String::new();
    for (name, bit) in NAMES {
        if mask & bit == *bit {
            if !out.is_empty() {
                out.push(',');
            }
            out.push_str(name);
        }
    }
    out
}

/// The list printed by `incrontab --types`.
pub fn supported_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = NAMES.iter().map(|(n, _)| *n).collect();
    names.extend(COMBINED.iter().map(|(n, _)| *n));
    names
}
