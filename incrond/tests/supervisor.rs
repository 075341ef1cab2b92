use std::error::Error;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tempfile::tempdir;

use incrond::errors::IncronError;
use incrond::exec::{ChildSupervisor, CompletionAction, Identity};
use incrond::table::masks::IN_CREATE;
use incrond::watch::WatchRegistry;

type TestResult = Result<(), Box<dyn Error>>;

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Reap until all children are gone, returning every completion action.
fn reap_until_empty(sup: &mut ChildSupervisor) -> Vec<CompletionAction> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut actions = Vec::new();
    while sup.live_count() > 0 && Instant::now() < deadline {
        actions.extend(sup.reap_all());
        std::thread::sleep(Duration::from_millis(10));
    }
    actions
}

#[test]
fn reaps_finished_children() -> TestResult {
    let mut sup = ChildSupervisor::new();
    sup.spawn(&argv(&["true"]), &Identity::Daemon, CompletionAction::Nothing)?;
    assert_eq!(sup.live_count(), 1);

    let actions = reap_until_empty(&mut sup);
    assert_eq!(sup.live_count(), 0);
    assert!(actions.iter().all(|a| *a == CompletionAction::Nothing));
    Ok(())
}

#[test]
fn completion_action_comes_back_on_reap() -> TestResult {
    let dir = tempdir()?;
    let mut registry = WatchRegistry::open()?;
    let wd = registry.add(dir.path(), IN_CREATE)?;

    let table = PathBuf::from("/var/spool/incron/alice");
    let mut sup = ChildSupervisor::new();
    sup.spawn(
        &argv(&["true"]),
        &Identity::Daemon,
        CompletionAction::ReenableWatch {
            table: table.clone(),
            wd: wd.clone(),
        },
    )?;

    let actions = reap_until_empty(&mut sup);
    assert_eq!(
        actions,
        vec![CompletionAction::ReenableWatch { table, wd }]
    );
    Ok(())
}

#[test]
fn forget_table_neutralizes_pending_actions() -> TestResult {
    let dir = tempdir()?;
    let mut registry = WatchRegistry::open()?;
    let wd = registry.add(dir.path(), IN_CREATE)?;

    let table = PathBuf::from("/var/spool/incron/bob");
    let mut sup = ChildSupervisor::new();
    sup.spawn(
        &argv(&["sleep", "0.2"]),
        &Identity::Daemon,
        CompletionAction::ReenableWatch {
            table: table.clone(),
            wd,
        },
    )?;

    sup.forget_table(&table);

    let actions = reap_until_empty(&mut sup);
    assert_eq!(sup.live_count(), 0);
    assert!(actions.iter().all(|a| *a == CompletionAction::Nothing));
    Ok(())
}

#[test]
fn spawn_failure_is_reported() {
    let mut sup = ChildSupervisor::new();
    let err = sup.spawn(
        &argv(&["/nonexistent/program"]),
        &Identity::Daemon,
        CompletionAction::Nothing,
    );
    assert!(matches!(err, Err(IncronError::Spawn(_))));
    assert_eq!(sup.live_count(), 0);
}

#[test]
fn user_identity_spawn_switches_uid() -> TestResult {
    use nix::unistd::{geteuid, User};

    // identity switching needs root; elsewhere the path is covered by
    // unknown_user_is_rejected
    if !geteuid().is_root() {
        return Ok(());
    }
    let Ok(Some(user)) = User::from_name("nobody") else {
        return Ok(());
    };

    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir()?;
    std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o777))?;
    let marker = dir.path().join("ran-as");

    let mut sup = ChildSupervisor::new();
    sup.spawn(
        &argv(&["touch", &marker.to_string_lossy()]),
        &Identity::User(user.name.clone()),
        CompletionAction::Nothing,
    )?;
    reap_until_empty(&mut sup);

    let meta = std::fs::metadata(&marker)?;
    use std::os::unix::fs::MetadataExt;
    assert_eq!(meta.uid(), user.uid.as_raw());
    Ok(())
}

#[test]
fn unknown_user_is_rejected() {
    let mut sup = ChildSupervisor::new();
    let err = sup.spawn(
        &argv(&["true"]),
        &Identity::User("no-such-user-here".to_string()),
        CompletionAction::Nothing,
    );
    assert!(matches!(err, Err(IncronError::UnknownUser(_))));
}
