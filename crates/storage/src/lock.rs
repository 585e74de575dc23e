// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The store's advisory lock-file protocol (§4.1 "Locking protocol").
//!
//! A sibling `<statePath>.lock` file is created with exclusive-create
//! semantics; its contents are a unix-milliseconds acquisition timestamp.
//! Unlike the teacher's `fs2`-based OS-level flock on the daemon PID file,
//! this lock is a plain file whose *age* (not OS ownership) determines
//! staleness, matching a single-JSON-document store shared by short-lived
//! CLI/webhook processes rather than one long-lived daemon.

use dispatch_core::{Clock, StoreLockError};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_millis(50);
pub const ACQUIRE_DEADLINE: Duration = Duration::from_secs(10);
pub const STALE_LOCK_AGE_MS: u64 = 30_000;

/// RAII guard for an acquired lock file. Dropping it releases the lock.
pub struct LockGuard {
    lock_path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Missing lock on release is not an error (handles crash-between-release).
        if let Err(err) = std::fs::remove_file(&self.lock_path) {
            if err.kind() != ErrorKind::NotFound {
                warn!(path = %self.lock_path.display(), error = %err, "failed to release store lock");
            }
        }
    }
}

/// Tunables for [`acquire`], defaulting to the §4.1 values but overridable
/// so tests don't have to wait out a real 10s deadline.
#[derive(Debug, Clone, Copy)]
pub struct LockTiming {
    pub retry_interval: Duration,
    pub acquire_deadline: Duration,
    pub stale_lock_age_ms: u64,
}

impl Default for LockTiming {
    fn default() -> Self {
        Self {
            retry_interval: ACQUIRE_RETRY_INTERVAL,
            acquire_deadline: ACQUIRE_DEADLINE,
            stale_lock_age_ms: STALE_LOCK_AGE_MS,
        }
    }
}

/// Acquire the advisory lock at `lock_path`, retrying on contention and
/// recovering from a stale or deadline-exceeded lock per §4.1.
pub fn acquire<C: Clock>(
    lock_path: &Path,
    clock: &C,
    timing: LockTiming,
) -> Result<LockGuard, StoreLockError> {
    let deadline = clock.now() + timing.acquire_deadline;

    loop {
        match create_exclusive(lock_path, clock.epoch_ms()) {
            Ok(()) => {
                debug!(path = %lock_path.display(), "acquired store lock");
                return Ok(LockGuard {
                    lock_path: lock_path.to_path_buf(),
                });
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                if let Some(age_ms) = lock_age_ms(lock_path, clock.epoch_ms()) {
                    if age_ms >= timing.stale_lock_age_ms {
                        warn!(path = %lock_path.display(), age_ms, "removing stale store lock");
                        let _ = std::fs::remove_file(lock_path);
                        continue;
                    }
                }

                if clock.now() >= deadline {
                    warn!(path = %lock_path.display(), "force-removing store lock after acquisition deadline");
                    let _ = std::fs::remove_file(lock_path);
                    create_exclusive(lock_path, clock.epoch_ms()).map_err(|_| StoreLockError)?;
                    return Ok(LockGuard {
                        lock_path: lock_path.to_path_buf(),
                    });
                }

                std::thread::sleep(timing.retry_interval);
            }
            Err(_) => return Err(StoreLockError),
        }
    }
}

fn create_exclusive(lock_path: &Path, timestamp_ms: u64) -> io::Result<()> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)?;
    write!(file, "{timestamp_ms}")?;
    Ok(())
}

/// `None` if the lock's recorded timestamp can't be read (e.g. it was
/// removed concurrently, or contains garbage from an incompatible writer);
/// treated as "not yet known to be stale" rather than an error.
fn lock_age_ms(lock_path: &Path, now_ms: u64) -> Option<u64> {
    let mut contents = String::new();
    File::open(lock_path).ok()?.read_to_string(&mut contents).ok()?;
    let recorded_ms: u64 = contents.trim().parse().ok()?;
    Some(now_ms.saturating_sub(recorded_ms))
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
