// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The locked persistent store (§4.1): single-file JSON document, guarded
//! read-modify-write via [`crate::lock`], atomic write via [`crate::writer`].

use crate::lock::{self, LockTiming};
use crate::migration::migrate_legacy_statuses;
use crate::writer::{atomic_write, FsStateWriter, StateWriter};
use dispatch_core::{Clock, DispatchState, StoreCorruptError, StoreError, SystemClock};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// Single-file JSON document store with an advisory sibling lock file.
pub struct LockedStore<W: StateWriter = FsStateWriter, C: Clock = SystemClock> {
    state_path: PathBuf,
    lock_path: PathBuf,
    writer: W,
    clock: C,
    lock_timing: LockTiming,
}

impl LockedStore<FsStateWriter, SystemClock> {
    /// Open the store at `state_path` using real filesystem I/O and the
    /// system clock.
    pub fn open(state_path: impl Into<PathBuf>) -> Self {
        Self::with_writer_and_clock(state_path, FsStateWriter, SystemClock)
    }

    /// Open the store at `<user home>/.openclaw/linear-dispatch-state.json`
    /// (§4.1 default `statePath`).
    pub fn open_default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::open(home.join(".openclaw").join("linear-dispatch-state.json"))
    }
}

impl<W: StateWriter, C: Clock> LockedStore<W, C> {
    pub fn with_writer_and_clock(state_path: impl Into<PathBuf>, writer: W, clock: C) -> Self {
        let state_path = state_path.into();
        let lock_path = state_path.with_extension("json.lock");
        Self {
            state_path,
            lock_path,
            writer,
            clock,
            lock_timing: LockTiming::default(),
        }
    }

    /// Override the lock acquisition timings (tests only need this to avoid
    /// waiting out the real 10s deadline).
    pub fn with_lock_timing(mut self, timing: LockTiming) -> Self {
        self.lock_timing = timing;
        self
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// `read() -> DispatchState` — current document, or empty if absent.
    /// Unlocked: accepts the read-skew risk the atomic-rename protocol
    /// bounds (§5 "Shared resource policy").
    pub fn read(&self) -> Result<DispatchState, StoreError> {
        self.read_from_disk()
    }

    /// `mutate(fn)` — acquire the lock, read, apply `f`, write atomically,
    /// release. `f` returning `Err` aborts without writing; the store is
    /// unchanged.
    pub fn mutate<T, E>(
        &self,
        f: impl FnOnce(&mut DispatchState) -> Result<T, E>,
    ) -> Result<T, MutateError<E>> {
        let _guard = lock::acquire(&self.lock_path, &self.clock, self.lock_timing)
            .map_err(MutateError::Store)?;

        let mut state = self.read_from_disk().map_err(|e| match e {
            StoreError::Corrupt(c) => MutateError::Store(StoreError::Corrupt(c)),
            other => MutateError::Store(other),
        })?;

        let result = f(&mut state).map_err(MutateError::Aborted)?;

        self.write_to_disk(&state).map_err(|e| MutateError::Store(StoreError::Io(e)))?;
        Ok(result)
    }

    fn read_from_disk(&self) -> Result<DispatchState, StoreError> {
        let contents = match std::fs::read_to_string(&self.state_path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(DispatchState::empty()),
            Err(err) => return Err(StoreError::Io(err)),
        };

        let value: serde_json::Value = serde_json::from_str(&contents)
            .map_err(|e| StoreError::Corrupt(StoreCorruptError::InvalidJson(e)))?;
        let migrated = migrate_legacy_statuses(value).map_err(StoreError::Corrupt)?;
        let state: DispatchState = serde_json::from_value(migrated)
            .map_err(|e| StoreError::Corrupt(StoreCorruptError::InvalidJson(e)))?;
        Ok(state)
    }

    fn write_to_disk(&self, state: &DispatchState) -> std::io::Result<()> {
        let data = serde_json::to_vec_pretty(state)?;
        atomic_write(&self.writer, &self.state_path, &data)?;
        info!(path = %self.state_path.display(), bytes = data.len(), "wrote dispatch state");
        Ok(())
    }
}

/// Error from [`LockedStore::mutate`]: either a store-level failure (lock
/// contention, corrupt file, I/O) or the closure's own abort value.
#[derive(Debug)]
pub enum MutateError<E> {
    Store(StoreError),
    Aborted(E),
}

impl<E: std::fmt::Display> std::fmt::Display for MutateError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutateError::Store(e) => write!(f, "{e}"),
            MutateError::Aborted(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for MutateError<E> {}

impl<E> MutateError<E> {
    /// Rewraps the abort value through `f`, keeping store errors as-is.
    /// Useful when the closure's error type is a thin local enum that a
    /// caller wants folded into a richer error.
    pub fn map_aborted<E2>(self, f: impl FnOnce(E) -> E2) -> MutateError<E2> {
        match self {
            MutateError::Store(e) => MutateError::Store(e),
            MutateError::Aborted(e) => MutateError::Aborted(f(e)),
        }
    }
}

#[cfg(test)]
#[path = "locked_store_tests.rs"]
mod tests;
