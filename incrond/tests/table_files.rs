use std::error::Error;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tempfile::tempdir;

use incrond::config::Config;
use incrond::table::masks::{IN_CLOSE_WRITE, IN_CREATE};
use incrond::table::{policy, Table};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn load_skips_comments_blanks_and_malformed_lines() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("alice");
    fs::write(
        &path,
        "# watched spool\n\
         \n\
         /var/mail IN_CLOSE_WRITE notify $@/$#\n\
         /only-two-columns IN_MODIFY\n\
         /tmp/in 8 handle $#\n",
    )?;

    let table = Table::load(&path)?;
    assert_eq!(table.len(), 2);
    assert_eq!(table.entries()[0].path, PathBuf::from("/var/mail"));
    assert_eq!(table.entries()[0].mask, IN_CLOSE_WRITE);
    assert_eq!(table.entries()[1].mask, 8);
    Ok(())
}

#[test]
fn save_then_load_preserves_rules() -> TestResult {
    let dir = tempdir()?;
    let src = dir.path().join("src");
    fs::write(
        &src,
        "/tmp/space\\ dir IN_CLOSE_WRITE,IN_CREATE echo $# >> /tmp/log\n\
         /tmp/plain IN_MODIFY,loopable=true,recursive=false touch /tmp/x\n",
    )?;

    let table = Table::load(&src)?;
    let out = dir.path().join("out");
    table.save(&out)?;
    let again = Table::load(&out)?;

    assert_eq!(table.entries(), again.entries());
    assert_eq!(again.entries()[0].path, PathBuf::from("/tmp/space dir"));
    assert_eq!(again.entries()[0].mask, IN_CLOSE_WRITE | IN_CREATE);
    assert!(!again.entries()[1].no_loop);
    assert!(again.entries()[1].no_recursion);
    Ok(())
}

#[test]
fn saved_tables_are_private() -> TestResult {
    let dir = tempdir()?;
    let src = dir.path().join("src");
    fs::write(&src, "/tmp IN_MODIFY echo hi\n")?;

    let out = dir.path().join("bob");
    Table::load(&src)?.save(&out)?;

    let mode = fs::metadata(&out)?.permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    Ok(())
}

fn policy_config(dir: &std::path::Path) -> Config {
    Config {
        allowed_users: dir.join("incron.allow"),
        denied_users: dir.join("incron.deny"),
        ..Config::default()
    }
}

#[test]
fn allow_file_takes_precedence() -> TestResult {
    let dir = tempdir()?;
    let cfg = policy_config(dir.path());
    fs::write(&cfg.allowed_users, "alice\n")?;
    // the deny file is ignored as soon as the allow file exists
    fs::write(&cfg.denied_users, "alice\n")?;

    assert!(policy::user_allowed(&cfg, "alice"));
    assert!(!policy::user_allowed(&cfg, "eve"));
    Ok(())
}

#[test]
fn deny_file_excludes_listed_users() -> TestResult {
    let dir = tempdir()?;
    let cfg = policy_config(dir.path());
    fs::write(&cfg.denied_users, "eve\n")?;

    assert!(policy::user_allowed(&cfg, "alice"));
    assert!(!policy::user_allowed(&cfg, "eve"));
    Ok(())
}

#[test]
fn everybody_allowed_without_policy_files() -> TestResult {
    let dir = tempdir()?;
    let cfg = policy_config(dir.path());

    assert!(policy::user_allowed(&cfg, "anyone"));
    Ok(())
}
