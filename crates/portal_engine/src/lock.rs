//! Advisory, crash-tolerant mutual exclusion over a browser profile directory.
//!
//! The lock is a small JSON file inside the profile. A record whose owner is
//! no longer running is stale and is replaced by the next acquirer. Two
//! acquirers racing between the read and the write can both succeed; the
//! window is a few syscalls wide and is accepted.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use engine_logging::{engine_debug, engine_info, engine_warn};
use serde::{Deserialize, Serialize};

use crate::persist::{ensure_dir, AtomicFileWriter, PersistError};

pub const LOCK_FILE_NAME: &str = ".session.lock";
/// Marker the browser engine leaves in a profile it believes is open.
pub const ENGINE_SINGLETON_MARKER: &str = "SingletonLock";

/// Owner of a profile directory, as written to the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    #[serde(rename = "startedAt")]
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
}

pub trait ProcessProbe: Send + Sync {
    fn liveness(&self, pid: u32) -> Liveness;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Probes with a zero-effect signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalProbe;

#[cfg(unix)]
impl ProcessProbe for SignalProbe {
    fn liveness(&self, pid: u32) -> Liveness {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        // pid 0 and values past i32::MAX would address process groups.
        let Ok(raw) = i32::try_from(pid) else {
            return Liveness::Dead;
        };
        if raw <= 0 {
            return Liveness::Dead;
        }
        match kill(Pid::from_raw(raw), None) {
            Ok(()) | Err(Errno::EPERM) => Liveness::Alive,
            Err(Errno::ESRCH) => Liveness::Dead,
            Err(other) => {
                engine_warn!("Liveness probe for pid {} failed: {}; assuming alive", pid, other);
                Liveness::Alive
            }
        }
    }
}

#[cfg(not(unix))]
impl ProcessProbe for SignalProbe {
    fn liveness(&self, pid: u32) -> Liveness {
        engine_warn!("No liveness probe on this platform; assuming pid {} is alive", pid);
        Liveness::Alive
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(
        "browser session already in use by process {pid} (since {}); close that process or delete {} if it is gone",
        .since.to_rfc3339_opts(SecondsFormat::Secs, true),
        .lock_path.display()
    )]
    SessionBusy {
        pid: u32,
        since: DateTime<Utc>,
        lock_path: PathBuf,
    },
    #[error("cannot record session lock in {}: {source}", .profile_dir.display())]
    Unwritable {
        profile_dir: PathBuf,
        #[source]
        source: PersistError,
    },
}

/// Result of a best-effort cleanup step. Never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Removed,
    AlreadyClear,
    Warned(String),
}

impl CleanupOutcome {
    pub fn warning(&self) -> Option<&str> {
        match self {
            CleanupOutcome::Warned(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for CleanupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupOutcome::Removed => write!(f, "removed"),
            CleanupOutcome::AlreadyClear => write!(f, "already clear"),
            CleanupOutcome::Warned(reason) => write!(f, "warning: {reason}"),
        }
    }
}

#[derive(Clone)]
pub struct LockManager {
    probe: Arc<dyn ProcessProbe>,
    clock: Arc<dyn Clock>,
    owner_pid: u32,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("owner_pid", &self.owner_pid)
            .finish_non_exhaustive()
    }
}

impl LockManager {
    pub fn new(probe: Arc<dyn ProcessProbe>, clock: Arc<dyn Clock>, owner_pid: u32) -> Self {
        Self {
            probe,
            clock,
            owner_pid,
        }
    }

    /// Signal probe, wall clock, and this process as owner.
    pub fn system() -> Self {
        Self::new(Arc::new(SignalProbe), Arc::new(SystemClock), std::process::id())
    }

    pub fn owner_pid(&self) -> u32 {
        self.owner_pid
    }

    pub fn lock_path(profile_dir: &Path) -> PathBuf {
        profile_dir.join(LOCK_FILE_NAME)
    }

    /// Reads the current record. Missing and corrupt files both read as `None`.
    pub fn read_record(profile_dir: &Path) -> Option<LockRecord> {
        let raw = fs::read_to_string(Self::lock_path(profile_dir)).ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub fn acquire(&self, profile_dir: &Path) -> Result<SessionLease, LockError> {
        let unwritable = |source: PersistError| LockError::Unwritable {
            profile_dir: profile_dir.to_path_buf(),
            source,
        };
        ensure_dir(profile_dir).map_err(unwritable)?;

        let lock_path = Self::lock_path(profile_dir);
        match fs::read_to_string(&lock_path) {
            Ok(raw) => match serde_json::from_str::<LockRecord>(&raw) {
                Ok(record) if self.probe.liveness(record.pid) == Liveness::Alive => {
                    return Err(LockError::SessionBusy {
                        pid: record.pid,
                        since: record.started_at,
                        lock_path,
                    });
                }
                Ok(record) => {
                    engine_info!(
                        "Discarding stale session lock left by process {} at {}",
                        record.pid,
                        record.started_at
                    );
                    discard(&lock_path);
                }
                Err(err) => {
                    engine_warn!("Discarding unreadable session lock {}: {}", lock_path.display(), err);
                    discard(&lock_path);
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                engine_warn!("Cannot read session lock {}: {}; replacing it", lock_path.display(), err);
                discard(&lock_path);
            }
        }

        let record = LockRecord {
            pid: self.owner_pid,
            started_at: self.clock.now(),
        };
        let body = serde_json::to_string(&record)
            .map_err(|err| unwritable(PersistError::Io(io::Error::other(err))))?;
        AtomicFileWriter::new(profile_dir)
            .write(LOCK_FILE_NAME, &body)
            .map_err(unwritable)?;
        engine_debug!("Session lock taken by {} in {}", record.pid, profile_dir.display());

        Ok(SessionLease {
            profile_dir: profile_dir.to_path_buf(),
            record,
            released: false,
        })
    }

    /// Deletes the lock record. Idempotent, never fails.
    pub fn release(&self, profile_dir: &Path) -> CleanupOutcome {
        release_lock(profile_dir)
    }

    /// Removes the browser engine's own singleton marker. Best effort.
    pub fn clear_stale_engine_artifacts(&self, profile_dir: &Path) -> CleanupOutcome {
        remove_file_quietly(&profile_dir.join(ENGINE_SINGLETON_MARKER))
    }
}

/// Proof of holding a profile. Dropping it releases the lock.
#[derive(Debug)]
#[must_use = "dropping the lease releases the session lock"]
pub struct SessionLease {
    profile_dir: PathBuf,
    record: LockRecord,
    released: bool,
}

impl SessionLease {
    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    pub fn release(mut self) -> CleanupOutcome {
        self.released = true;
        release_lock(&self.profile_dir)
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Some(reason) = release_lock(&self.profile_dir).warning() {
            engine_warn!("Session lock release on drop: {}", reason);
        }
    }
}

fn release_lock(profile_dir: &Path) -> CleanupOutcome {
    let outcome = remove_file_quietly(&LockManager::lock_path(profile_dir));
    if let Some(reason) = outcome.warning() {
        engine_warn!("Could not release session lock: {}", reason);
    }
    outcome
}

fn discard(path: &Path) {
    if let Some(reason) = remove_file_quietly(path).warning() {
        engine_warn!("{}", reason);
    }
}

fn remove_file_quietly(path: &Path) -> CleanupOutcome {
    match fs::remove_file(path) {
        Ok(()) => CleanupOutcome::Removed,
        Err(err) if err.kind() == io::ErrorKind::NotFound => CleanupOutcome::AlreadyClear,
        Err(err) => CleanupOutcome::Warned(format!("failed to remove {}: {err}", path.display())),
    }
}
