// src/ops.rs

//! Table manipulation operations.
//!
//! All messages go to stderr (the listing itself to stdout) so the
//! output can be piped. Operations act on the table of one user; the
//! daemon notices every change through its management watches, so no
//! signalling is needed beyond touching the table file.

use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use nix::unistd::{access, chown, AccessFlags, User};

use incrond::config::Config;
use incrond::table::{masks, Table};

/// Alternative editor consulted before the hard-wired fallback.
const ALT_EDITOR: &str = "/etc/alternatives/editor";

/// Default (hard-wired) editor.
const DEFAULT_EDITOR: &str = "vim";

/// Print the user's table verbatim.
pub fn list_table(cfg: &Config, user: &str) -> Result<()> {
    let path = cfg.user_table_path(user);
    match fs::read_to_string(&path) {
        Ok(contents) => {
            print!("{contents}");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            eprintln!("no table for {user}");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("cannot read table for '{user}'")),
    }
}

/// Remove the user's table; absence counts as success.
pub fn remove_table(cfg: &Config, user: &str) -> Result<()> {
    let path = cfg.user_table_path(user);
    match fs::remove_file(&path) {
        Ok(()) => {
            eprintln!("table for user '{user}' successfully removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            eprintln!("table for user '{user}' does not exist");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("cannot remove table for user '{user}'")),
    }
}

/// Print the supported symbolic event names.
pub fn list_types() {
    println!("{}", masks::supported_names().join(","));
}

/// Ask the daemon to reload the user's table by opening it for append
/// and closing it again: the daemon reloads on the resulting
/// `IN_CLOSE_WRITE`.
pub fn reload_table(cfg: &Config, user: &str) -> Result<()> {
    eprintln!("requesting table reload for user '{user}'...");

    let path = cfg.user_table_path(user);
    match fs::OpenOptions::new().append(true).open(&path) {
        Ok(file) => {
            drop(file);
            eprintln!("reload request sent");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            eprintln!("no table for '{user}'");
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("cannot access table for '{user}'")),
    }
}

/// Import a table from a file (`-` = standard input), replacing the
/// user's current table.
pub fn import_table(cfg: &Config, user: &str, source: &Path) -> Result<()> {
    eprintln!("copying table from file '{}'", source.display());

    let source = if source == Path::new("-") {
        PathBuf::from("/dev/stdin")
    } else {
        source.to_path_buf()
    };

    let table = Table::load(&source)
        .with_context(|| format!("cannot load table from file '{}'", source.display()))?;

    let out = cfg.user_table_path(user);
    table
        .save(&out)
        .with_context(|| format!("cannot create table for user '{user}'"))?;

    chown_to_user(&out, user)?;
    Ok(())
}

/// Run the user's editor on a temporary copy of the table and install
/// the result when it changed.
pub fn edit_table(cfg: &Config, user: &str) -> Result<()> {
    let table_path = cfg.user_table_path(user);
    let pwd = lookup_user(user)?;

    let mut temp = tempfile::Builder::new()
        .prefix("incron.table-")
        .tempfile_in("/tmp")
        .context("cannot create temporary file")?;

    // the editor runs as the table's owner and must be able to rewrite it
    chown(temp.path(), Some(pwd.uid), Some(pwd.gid)).context("cannot hand over temporary file")?;

    match fs::File::open(&table_path) {
        Ok(mut current) => {
            let mut contents = String::new();
            current.read_to_string(&mut contents)?;
            temp.write_all(contents.as_bytes())?;
            temp.flush()?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("cannot read old table for '{user}'")),
    }

    let before = fs::metadata(temp.path())
        .context("cannot stat temporary file")?
        .modified()?;

    let editor = select_editor(cfg);
    let mut cmd = Command::new(&editor);
    cmd.arg(temp.path());
    let uid = pwd.uid;
    let gid = pwd.gid;
    unsafe {
        cmd.pre_exec(move || {
            nix::unistd::setgid(gid).map_err(errno_to_io)?;
            nix::unistd::setuid(uid).map_err(errno_to_io)?;
            Ok(())
        });
    }
    let status = cmd
        .status()
        .with_context(|| format!("cannot start editor '{editor}'"))?;
    if !status.success() {
        bail!("editor finished with error");
    }

    let after = fs::metadata(temp.path())
        .context("cannot stat temporary file")?
        .modified()?;
    if before == after {
        eprintln!("table unchanged");
        return Ok(());
    }

    let table = Table::load(temp.path()).context("cannot parse edited table")?;
    table
        .save(&table_path)
        .with_context(|| format!("cannot install table for user '{user}'"))?;
    fs::set_permissions(&table_path, fs::Permissions::from_mode(0o600))?;
    chown_to_user(&table_path, user)?;

    eprintln!("table updated");
    Ok(())
}

/// Editor selecting algorithm:
/// 1. `$EDITOR`
/// 2. `$VISUAL`
/// 3. the configuration `editor` key
/// 4. /etc/alternatives/editor, if executable
/// 5. the hard-wired fallback
fn select_editor(cfg: &Config) -> String {
    if let Ok(e) = std::env::var("EDITOR") {
        if !e.is_empty() {
            return e;
        }
    }
    if let Ok(e) = std::env::var("VISUAL") {
        if !e.is_empty() {
            return e;
        }
    }
    if !cfg.editor.is_empty() {
        return cfg.editor.clone();
    }
    if access(ALT_EDITOR, AccessFlags::X_OK).is_ok() {
        return ALT_EDITOR.to_string();
    }
    DEFAULT_EDITOR.to_string()
}

fn lookup_user(user: &str) -> Result<User> {
    match User::from_name(user) {
        Ok(Some(pwd)) => Ok(pwd),
        _ => bail!("cannot find user '{user}'"),
    }
}

fn chown_to_user(path: &Path, user: &str) -> Result<()> {
    let pwd = lookup_user(user)?;
    chown(path, Some(pwd.uid), None)
        .with_context(|| format!("cannot set owner '{user}' on '{}'", path.display()))
}

fn errno_to_io(e: nix::errno::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(e as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::getuid;
    use tempfile::tempdir;

    fn current_user() -> String {
        User::from_uid(getuid()).unwrap().unwrap().name
    }

    fn test_config(dir: &Path) -> Config {
        Config {
            user_table_dir: dir.to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn import_installs_table_for_user() {
        let dir = tempdir().unwrap();
        let cfg = test_config(dir.path());
        let user = current_user();

        let src = dir.path().join("source");
        fs::write(&src, "/tmp IN_CLOSE_WRITE echo $#\n").unwrap();

        import_table(&cfg, &user, &src).unwrap();

        let installed = fs::read_to_string(cfg.user_table_path(&user)).unwrap();
        assert!(installed.contains("IN_CLOSE_WRITE"));
    }

    #[test]
    fn remove_tolerates_missing_table() {
        let dir = tempdir().unwrap();
        let cfg = test_config(dir.path());

        remove_table(&cfg, &current_user()).unwrap();
    }

    #[test]
    fn remove_deletes_existing_table() {
        let dir = tempdir().unwrap();
        let cfg = test_config(dir.path());
        let user = current_user();

        let path = cfg.user_table_path(&user);
        fs::write(&path, "/tmp IN_MODIFY echo x\n").unwrap();

        remove_table(&cfg, &user).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn reload_tolerates_missing_table() {
        let dir = tempdir().unwrap();
        let cfg = test_config(dir.path());

        reload_table(&cfg, &current_user()).unwrap();
    }

    #[test]
    fn reload_leaves_table_contents_alone() {
        let dir = tempdir().unwrap();
        let cfg = test_config(dir.path());
        let user = current_user();

        let path = cfg.user_table_path(&user);
        fs::write(&path, "/tmp IN_MODIFY echo x\n").unwrap();

        reload_table(&cfg, &user).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "/tmp IN_MODIFY echo x\n"
        );
    }
}
