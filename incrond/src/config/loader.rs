// src/config/loader.rs

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use super::model::Config;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/incron.conf";

/// Load configuration from an explicit path.
///
/// The file must exist when named explicitly (`--config`); a missing or
/// malformed line is skipped, everything else falls back to defaults.
pub fn load(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading configuration file {}", path.display()))?;
    Ok(parse(&contents))
}

/// Load the default configuration file, or built-in defaults when it does
/// not exist.
pub fn load_default() -> Result<Config> {
    match fs::read_to_string(DEFAULT_CONFIG_PATH) {
        Ok(contents) => Ok(parse(&contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => {
            Err(e).with_context(|| format!("reading configuration file {DEFAULT_CONFIG_PATH}"))
        }
    }
}

fn parse(contents: &str) -> Config {
    let mut cfg = Config::default();
    for line in contents.lines() {
        if let Some((key, value)) = parse_line(line) {
            cfg.set(key, value);
        }
    }
    cfg
}

/// Split one `key = value` line. Returns `None` for blank lines, comments
/// and lines without `=`.
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_overrides_and_keeps_defaults() {
        let cfg = parse(
            "# comment\n\
             system_table_dir = /opt/incron.d\n\
             \n\
             lockfile_name = incrond-test\n\
             bogus_key = whatever\n",
        );
        assert_eq!(cfg.system_table_dir, PathBuf::from("/opt/incron.d"));
        assert_eq!(cfg.lockfile_name, "incrond-test");
        assert_eq!(cfg.user_table_dir, PathBuf::from("/var/spool/incron"));
    }

    #[test]
    fn empty_value_allowed() {
        let cfg = parse("editor =\n");
        assert_eq!(cfg.editor, "");
    }

    #[test]
    fn lines_without_assignment_skipped() {
        let cfg = parse("just some text\n");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn table_path_helpers() {
        let cfg = Config::default();
        assert_eq!(
            cfg.user_table_path("alice"),
            PathBuf::from("/var/spool/incron/alice")
        );
        assert_eq!(
            cfg.system_table_path("backup"),
            PathBuf::from("/etc/incron.d/backup")
        );
        assert_eq!(cfg.lockfile_path(), PathBuf::from("/var/run/incrond.pid"));
    }
}
