// src/table/entry.rs

//! A single table rule: watched path, event mask, command template.

use std::fmt;
use std::path::PathBuf;

use super::masks;

/// One rule line.
///
/// `no_loop` (loop avoidance) is on by default: while a command spawned by
/// a rule is still running, the rule's watch is suspended so the command
/// cannot re-trigger itself. `loopable=true` in the mask column opts out;
/// the legacy `IN_NO_LOOP` token is accepted and keeps the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: PathBuf,
    pub mask: u32,
    pub cmd: String,
    pub no_loop: bool,
    pub no_recursion: bool,
}

impl Entry {
    pub fn new(path: impl Into<PathBuf>, mask: u32, cmd: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mask,
            cmd: cmd.into(),
            no_loop: true,
            no_recursion: false,
        }
    }

    /// Parse one rule line. Returns `None` when the line does not have all
    /// three columns or the command is empty.
    pub fn parse(line: &str) -> Option<Self> {
        let mut chars = line.trim_start().chars().peekable();

        // Path column: backslash escapes the next character, so watched
        // paths may contain spaces.
        let mut path = String::new();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(escaped) => path.push(escaped),
                    None => break,
                },
                c if c.is_whitespace() => break,
                c => path.push(c),
            }
        }
        if path.is_empty() {
            return None;
        }

        // Mask column: single whitespace-delimited token.
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let mut mask_col = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            mask_col.push(c);
            chars.next();
        }
        if mask_col.is_empty() {
            return None;
        }

        // Command column: the rest of the line.
        let cmd: String = chars.collect::<String>().trim().to_string();
        if cmd.is_empty() {
            return None;
        }

        let mut entry = Entry::new(path, 0, cmd);
        entry.apply_mask_column(&mask_col);
        Some(entry)
    }

    /// Interpret the mask column: a decimal literal is a raw bitset,
    /// otherwise a comma-separated list of symbolic names and flag tokens.
    /// Unknown tokens are ignored silently.
    fn apply_mask_column(&mut self, col: &str) {
        if let Ok(raw) = col.parse::<u32>() {
            self.mask = raw;
            return;
        }

        for token in col.split(',') {
            match token {
                "IN_NO_LOOP" => self.no_loop = true,
                "loopable=true" => self.no_loop = false,
                "loopable=false" => self.no_loop = true,
                "recursive=false" => self.no_recursion = true,
                "recursive=true" => self.no_recursion = false,
                name => {
                    if let Some(bit) = masks::bit_for_name(name) {
                        self.mask |= bit;
                    }
                }
            }
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut mask_col = masks::dump(self.mask);
        if mask_col.is_empty() {
            mask_col.push('0');
        }
        if !self.no_loop {
            mask_col.push_str(",loopable=true");
        }
        if self.no_recursion {
            mask_col.push_str(",recursive=false");
        }

        write!(
            f,
            "{} {} {}",
            escape_spaces(&self.path.to_string_lossy()),
            mask_col,
            self.cmd
        )
    }
}

/// Escape a path for the table format and for `$@`/`$#` expansion:
/// backslash doubles, spaces get a backslash prefix.
pub fn escape_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ' ' => out.push_str("\\ "),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::masks::{IN_CLOSE_WRITE, IN_MODIFY};

    #[test]
    fn parses_symbolic_mask() {
        let e = Entry::parse("/var/mail IN_CLOSE_WRITE,IN_MODIFY abc $@/$#").unwrap();
        assert_eq!(e.path, PathBuf::from("/var/mail"));
        assert_eq!(e.mask, IN_CLOSE_WRITE | IN_MODIFY);
        assert_eq!(e.cmd, "abc $@/$#");
        assert!(e.no_loop);
        assert!(!e.no_recursion);
    }

    #[test]
    fn parses_decimal_mask() {
        let e = Entry::parse("/tmp 8 echo hi").unwrap();
        assert_eq!(e.mask, 8);
    }

    #[test]
    fn parses_escaped_spaces_in_path() {
        let e = Entry::parse("/tmp/space\\ dir IN_CREATE echo x").unwrap();
        assert_eq!(e.path, PathBuf::from("/tmp/space dir"));
    }

    #[test]
    fn unknown_mask_tokens_ignored() {
        let e = Entry::parse("/tmp IN_CLOSE_WRITE,IN_NONSENSE echo x").unwrap();
        assert_eq!(e.mask, IN_CLOSE_WRITE);
    }

    #[test]
    fn flag_tokens() {
        let e = Entry::parse("/tmp IN_MODIFY,loopable=true echo x").unwrap();
        assert!(!e.no_loop);
        let e = Entry::parse("/tmp IN_MODIFY,IN_NO_LOOP touch /tmp/w").unwrap();
        assert!(e.no_loop);
        let e = Entry::parse("/tmp IN_MODIFY,recursive=false echo x").unwrap();
        assert!(e.no_recursion);
    }

    #[test]
    fn missing_columns_rejected() {
        assert!(Entry::parse("/tmp").is_none());
        assert!(Entry::parse("/tmp IN_MODIFY").is_none());
        assert!(Entry::parse("").is_none());
    }

    #[test]
    fn display_round_trips() {
        let e = Entry::parse("/tmp/space\\ dir IN_CLOSE_WRITE,loopable=true echo $#").unwrap();
        let again = Entry::parse(&e.to_string()).unwrap();
        assert_eq!(e, again);
    }

    #[test]
    fn escape_spaces_escapes_backslash_first() {
        assert_eq!(escape_spaces("a b"), "a\\ b");
        assert_eq!(escape_spaces("a\\b"), "a\\\\b");
    }
}
