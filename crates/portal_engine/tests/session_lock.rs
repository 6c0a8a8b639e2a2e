use std::fs;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use portal_engine::{
    CleanupOutcome, Clock, Liveness, LockError, LockManager, LockRecord, ProcessProbe,
    ENGINE_SINGLETON_MARKER, LOCK_FILE_NAME,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

struct FixedProbe(Liveness);

impl ProcessProbe for FixedProbe {
    fn liveness(&self, _pid: u32) -> Liveness {
        self.0
    }
}

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn manager(liveness: Liveness, pid: u32) -> LockManager {
    LockManager::new(Arc::new(FixedProbe(liveness)), Arc::new(FixedClock(noon())), pid)
}

#[test]
fn second_acquirer_is_refused_while_owner_lives() {
    let dir = TempDir::new().unwrap();
    let first = manager(Liveness::Alive, 100);
    let second = manager(Liveness::Alive, 200);

    let lease = first.acquire(dir.path()).unwrap();
    let err = second.acquire(dir.path()).unwrap_err();

    match &err {
        LockError::SessionBusy { pid, since, .. } => {
            assert_eq!(*pid, 100);
            assert_eq!(*since, noon());
        }
        other => panic!("expected SessionBusy, got {other:?}"),
    }
    assert!(err.to_string().contains("process 100"));

    drop(lease);
    assert!(second.acquire(dir.path()).is_ok());
}

#[test]
fn lock_file_is_human_readable_json() {
    let dir = TempDir::new().unwrap();
    let _lease = manager(Liveness::Alive, 4821).acquire(dir.path()).unwrap();

    let raw = fs::read_to_string(dir.path().join(LOCK_FILE_NAME)).unwrap();
    assert!(raw.starts_with(r#"{"pid":4821,"startedAt":"2025-03-01T12:00:00"#), "{raw}");
    assert_eq!(
        LockManager::read_record(dir.path()),
        Some(LockRecord {
            pid: 4821,
            started_at: noon(),
        })
    );
}

#[test]
fn stale_lock_from_dead_owner_is_replaced() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(LOCK_FILE_NAME),
        r#"{"pid":99999,"startedAt":"2024-01-01T00:00:00Z"}"#,
    )
    .unwrap();

    let lease = manager(Liveness::Dead, 7).acquire(dir.path()).unwrap();

    assert_eq!(lease.record().pid, 7);
    assert_eq!(LockManager::read_record(dir.path()).map(|r| r.pid), Some(7));
}

#[test]
fn corrupt_lock_never_blocks() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(LOCK_FILE_NAME), "{not json").unwrap();

    let lease = manager(Liveness::Alive, 7).acquire(dir.path()).unwrap();

    assert_eq!(lease.record().pid, 7);
}

#[test]
fn missing_profile_directory_is_created() {
    let dir = TempDir::new().unwrap();
    let profile = dir.path().join("nested").join("profile");

    let _lease = manager(Liveness::Alive, 1).acquire(&profile).unwrap();

    assert!(profile.join(LOCK_FILE_NAME).is_file());
}

#[test]
fn release_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let locks = manager(Liveness::Alive, 1);
    let lease = locks.acquire(dir.path()).unwrap();

    assert_eq!(lease.release(), CleanupOutcome::Removed);
    assert_eq!(locks.release(dir.path()), CleanupOutcome::AlreadyClear);
    assert_eq!(locks.release(dir.path()), CleanupOutcome::AlreadyClear);
    assert!(!dir.path().join(LOCK_FILE_NAME).exists());
}

#[test]
fn dropping_a_lease_releases_the_lock() {
    let dir = TempDir::new().unwrap();
    {
        let _lease = manager(Liveness::Alive, 1).acquire(dir.path()).unwrap();
        assert!(dir.path().join(LOCK_FILE_NAME).exists());
    }
    assert!(!dir.path().join(LOCK_FILE_NAME).exists());
}

#[test]
fn engine_marker_cleanup_is_best_effort() {
    let dir = TempDir::new().unwrap();
    let locks = manager(Liveness::Alive, 1);
    fs::write(dir.path().join(ENGINE_SINGLETON_MARKER), "host-1").unwrap();

    assert_eq!(locks.clear_stale_engine_artifacts(dir.path()), CleanupOutcome::Removed);
    assert_eq!(locks.clear_stale_engine_artifacts(dir.path()), CleanupOutcome::AlreadyClear);
}

#[test]
fn release_problems_are_warnings_not_errors() {
    let dir = TempDir::new().unwrap();
    // A directory where the lock file should be cannot be removed as a file.
    fs::create_dir(dir.path().join(LOCK_FILE_NAME)).unwrap();

    let outcome = manager(Liveness::Alive, 1).release(dir.path());

    assert!(outcome.warning().is_some());
}
