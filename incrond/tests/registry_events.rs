use std::error::Error;
use std::fs;
use std::time::{Duration, Instant};

use inotify::EventMask;
use tempfile::tempdir;

use incrond::table::masks::{IN_CLOSE_WRITE, IN_CREATE};
use incrond::watch::{RegistryEvent, WatchRegistry};

type TestResult = Result<(), Box<dyn Error>>;

/// Drain with a short grace period so the kernel has queued the events.
fn drain_events(registry: &mut WatchRegistry) -> Vec<RegistryEvent> {
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut events = Vec::new();
    loop {
        registry.drain().expect("drain failed");
        while let Some(event) = registry.next_event() {
            events.push(event);
        }
        if !events.is_empty() || Instant::now() > deadline {
            return events;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn close_write_event_carries_child_name() -> TestResult {
    let dir = tempdir()?;
    let mut registry = WatchRegistry::open()?;
    let wd = registry.add(dir.path(), IN_CLOSE_WRITE | IN_CREATE)?;

    fs::write(dir.path().join("foo"), "payload")?;

    let events = drain_events(&mut registry);
    let close = events
        .iter()
        .find(|e| e.is_type(EventMask::CLOSE_WRITE))
        .expect("no CLOSE_WRITE event");
    assert_eq!(close.wd, wd);
    assert_eq!(close.name_lossy(), "foo");
    Ok(())
}

#[test]
fn registry_maps_descriptor_back_to_watch() -> TestResult {
    let dir = tempdir()?;
    let mut registry = WatchRegistry::open()?;
    let wd = registry.add(dir.path(), IN_CREATE)?;

    let watch = registry.watch(&wd).expect("watch not found");
    assert_eq!(watch.path, dir.path());
    assert_eq!(watch.mask, IN_CREATE);
    assert!(watch.enabled);
    assert_eq!(registry.watch_count(), 1);
    Ok(())
}

#[test]
fn disabled_watch_delivers_nothing() -> TestResult {
    let dir = tempdir()?;
    let mut registry = WatchRegistry::open()?;
    let wd = registry.add(dir.path(), IN_CLOSE_WRITE)?;

    registry.set_enabled(&wd, false)?;
    fs::write(dir.path().join("quiet"), "x")?;
    std::thread::sleep(Duration::from_millis(100));
    registry.drain()?;
    assert!(registry.next_event().is_none());

    registry.set_enabled(&wd, true)?;
    fs::write(dir.path().join("loud"), "x")?;
    let events = drain_events(&mut registry);
    assert!(events.iter().any(|e| e.is_type(EventMask::CLOSE_WRITE)));
    Ok(())
}

#[test]
fn add_failure_on_missing_path() {
    let mut registry = WatchRegistry::open().unwrap();
    let err = registry.add(
        std::path::Path::new("/nonexistent/definitely/missing"),
        IN_CREATE,
    );
    assert!(err.is_err());
    assert_eq!(registry.watch_count(), 0);
}

#[test]
fn remove_is_idempotent() -> TestResult {
    let dir = tempdir()?;
    let mut registry = WatchRegistry::open()?;
    let wd = registry.add(dir.path(), IN_CREATE)?;

    registry.remove(&wd);
    registry.remove(&wd);
    assert_eq!(registry.watch_count(), 0);

    // events for other watches survive a removal
    let other = tempdir()?;
    let kept = registry.add(other.path(), IN_CLOSE_WRITE)?;
    fs::write(other.path().join("still-there"), "x")?;
    let events = drain_events(&mut registry);
    assert!(events.iter().any(|e| e.wd == kept));
    Ok(())
}
