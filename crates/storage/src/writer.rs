// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic write trait, abstracting the tmp-file-then-rename-then-fsync
//! sequence (§4.1 "Atomic write") for testability.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Durable write primitives used by [`crate::locked_store::LockedStore`].
///
/// All file operations go through this trait so tests can inject failures
/// at any step without touching a real filesystem.
pub trait StateWriter: Clone + Send + Sync + 'static {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> io::Result<()>;
    fn fsync_file(&self, path: &Path) -> io::Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn fsync_dir(&self, path: &Path) -> io::Result<()>;
}

/// Production writer using real filesystem operations.
#[derive(Clone, Copy, Default)]
pub struct FsStateWriter;

impl StateWriter for FsStateWriter {
    fn write_tmp(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(data)?;
        Ok(())
    }

    fn fsync_file(&self, path: &Path) -> io::Result<()> {
        File::open(path)?.sync_all()
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn fsync_dir(&self, path: &Path) -> io::Result<()> {
        // Not all platforms support opening a directory for fsync (notably
        // Windows); failing to fsync the directory entry doesn't undo the
        // already-durable rename, so this is best-effort.
        match File::open(path) {
            Ok(dir) => dir.sync_all(),
            Err(_) => Ok(()),
        }
    }
}

/// Perform the tmp-write / fsync / rename / fsync-dir sequence for `data`
/// destined at `path`.
pub(crate) fn atomic_write<W: StateWriter>(writer: &W, path: &Path, data: &[u8]) -> io::Result<()> {
    // `.with_extension("tmp")` would replace `path`'s existing extension
    // rather than append one (`state.json` -> `state.tmp`, losing the
    // `.json` suffix); append onto the raw `OsStr` instead, matching the
    // lock file's `<statePath>.json.lock` suffix-append convention.
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    writer.write_tmp(&tmp_path, data)?;
    writer.fsync_file(&tmp_path)?;
    writer.rename(&tmp_path, path)?;
    if let Some(parent) = path.parent() {
        writer.fsync_dir(parent)?;
    }
    Ok(())
}
