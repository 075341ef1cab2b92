// src/table/mod.rs

//! Rule tables.
//!
//! A table file holds one rule per line:
//!
//! ```text
//! <path>  <mask>  <command template>
//! ```
//!
//! - [`masks`] maps symbolic event names (`IN_CLOSE_WRITE`, ...) to bits.
//! - [`entry`] parses and serializes single rules.
//! - [`policy`] implements the allow/deny authorization files.

pub mod entry;
pub mod masks;
pub mod policy;

use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::warn;

pub use entry::Entry;

/// An ordered rule table loaded from one file.
#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a table file.
    ///
    /// Blank lines and lines whose first non-whitespace byte is `#` are
    /// skipped. Malformed lines are dropped with a warning; loading
    /// continues with the remaining rules.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        let mut entries = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match Entry::parse(line) {
                Some(entry) => entries.push(entry),
                None => {
                    warn!(
                        table = %path.display(),
                        line = lineno + 1,
                        "malformed rule dropped"
                    );
                }
            }
        }

        Ok(Self { entries })
    }

    /// Serialize the table back to disk.
    ///
    /// The file is created with mode 0600 so user tables stay private to
    /// their owner.
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path.as_ref())?;

        for entry in &self.entries {
            writeln!(file, "{}", entry)?;
        }

        Ok(())
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
