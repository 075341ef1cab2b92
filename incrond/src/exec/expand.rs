// src/exec/expand.rs

//! Command template expansion and tokenization.
//!
//! Placeholders, scanned left to right:
//!
//! | placeholder | replacement                                      |
//! |-------------|--------------------------------------------------|
//! | `$$`        | literal `$`                                      |
//! | `$@`        | watched path, space-escaped                      |
//! | `$#`        | event name (basename), space-escaped             |
//! | `$%`        | comma-separated symbolic names of fired kinds    |
//! | `$&`        | numeric event mask, decimal                      |
//! | `$x`        | `x` for any other character                      |

use std::path::Path;

use crate::errors::{IncronError, Result};
use crate::table::entry::escape_spaces;
use crate::table::masks;

/// The event context a template is expanded against.
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    /// The watched path of the originating watch.
    pub watch_path: &'a Path,
    /// The event's basename; empty when the event concerns the watched
    /// path itself.
    pub name: &'a str,
    /// Mask of fired event kinds.
    pub mask: u32,
}

/// Substitute all placeholders in a command template.
pub fn expand_command(template: &str, ctx: &EventContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('$') => out.push('$'),
            Some('@') => out.push_str(&escape_spaces(&ctx.watch_path.to_string_lossy())),
            Some('#') => out.push_str(&escape_spaces(ctx.name)),
            Some('%') => out.push_str(&masks::dump(ctx.mask)),
            Some('&') => out.push_str(&ctx.mask.to_string()),
            Some(other) => out.push(other),
            // trailing `$` stays literal
            None => out.push('$'),
        }
    }

    out
}

/// Split an expanded command into argv tokens.
///
/// Space and tab delimit tokens. A backslash makes the following
/// character part of the current token (`\ ` keeps a space, `\\` yields a
/// literal backslash). Empty tokens from consecutive delimiters are
/// elided. An empty result is an error.
pub fn tokenize(cmd: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut chars = cmd.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => current.push(escaped),
                None => current.push('\\'),
            },
            ' ' | '\t' => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }

    if args.is_empty() {
        return Err(IncronError::BadCommand);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::masks::IN_CLOSE_WRITE;

    fn ctx<'a>(path: &'a str, name: &'a str) -> EventContext<'a> {
        EventContext {
            watch_path: Path::new(path),
            name,
            mask: IN_CLOSE_WRITE,
        }
    }

    #[test]
    fn dollar_escapes() {
        let c = ctx("/tmp", "f");
        assert_eq!(expand_command("a $$ b", &c), "a $ b");
        assert_eq!(expand_command("end$", &c), "end$");
        assert_eq!(expand_command("$x", &c), "x");
    }

    #[test]
    fn spaces_are_escaped_in_path_and_name() {
        let c = ctx("/tmp/space dir", "a b.txt");
        let cmd = expand_command("echo @=$@ #=$# m=$% n=$&", &c);
        assert_eq!(
            cmd,
            "echo @=/tmp/space\\ dir #=a\\ b.txt m=IN_CLOSE_WRITE n=8"
        );
        assert_eq!(tokenize(&cmd).unwrap().len(), 5);
    }

    #[test]
    fn event_name_stays_one_token() {
        let c = ctx("/tmp", "a b c.txt");
        let argv = tokenize(&expand_command("touch $#", &c)).unwrap();
        assert_eq!(argv, vec!["touch", "a b c.txt"]);
    }

    #[test]
    fn consecutive_delimiters_elided() {
        let argv = tokenize("echo \t  hi").unwrap();
        assert_eq!(argv, vec!["echo", "hi"]);
    }

    #[test]
    fn escaped_backslash() {
        let argv = tokenize("echo a\\\\b").unwrap();
        assert_eq!(argv, vec!["echo", "a\\b"]);
    }

    #[test]
    fn empty_command_rejected() {
        assert!(matches!(tokenize("   "), Err(IncronError::BadCommand)));
        assert!(matches!(tokenize(""), Err(IncronError::BadCommand)));
    }
}
