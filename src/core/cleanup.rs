//! Purpose: Reclaim staging directories left behind by processes that are gone.
//! Exports: `CleanupReport`, `clean_abandoned`.
//! Role: Best-effort garbage collection run after every successful extraction.
//! Invariants: A directory is abandoned only if it starts with the prefix and has no lock marker.
//! Invariants: The collector then creates the marker itself under an exclusive `fs2` lock, so a
//! Invariants: holder arriving mid-sweep blocks on it and retries once the sweep is done.
//! Invariants: Every failure is recorded and swallowed; nothing here returns an error.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::Serialize;

use crate::core::staging::{lock_file_name, marker_is_current};

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub in_use: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

enum Sweep {
    Removed,
    InUse,
    Failed,
}

pub fn clean_abandoned(temp_root: &Path, prefix: &str, file_name: &str) -> CleanupReport {
    let mut report = CleanupReport::default();
    let lock_name = lock_file_name(file_name);

    let entries = match fs::read_dir(temp_root) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(root = %temp_root.display(), %err, "cannot scan temp root");
            return report;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(prefix) {
            continue;
        }
        let dir = entry.path();
        // symlink_metadata so a link named like a staging dir is never followed
        match fs::symlink_metadata(&dir) {
            Ok(meta) if meta.is_dir() => {}
            _ => continue,
        }

        match sweep(&dir, &lock_name) {
            Sweep::Removed => {
                tracing::debug!(dir = %dir.display(), "removed abandoned staging directory");
                report.removed.push(dir);
            }
            Sweep::InUse => report.in_use.push(dir),
            Sweep::Failed => {
                tracing::debug!(dir = %dir.display(), "could not remove staging directory");
                report.failed.push(dir);
            }
        }
    }

    report
}

fn sweep(dir: &Path, lock_name: &str) -> Sweep {
    let marker_path = dir.join(lock_name);
    match fs::symlink_metadata(&marker_path) {
        Ok(_) => return Sweep::InUse,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(_) => return Sweep::Failed,
    }

    // Claim the directory with our own marker so a holder arriving mid-sweep waits on it.
    let marker = match OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&marker_path)
    {
        Ok(marker) => marker,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Sweep::InUse,
        Err(err) => {
            tracing::debug!(dir = %dir.display(), %err, "cannot claim staging directory");
            return Sweep::Failed;
        }
    };
    if marker.try_lock_exclusive().is_err() || !marker_is_current(&marker, &marker_path) {
        return Sweep::InUse;
    }
    let removed = remove_staging_dir(&marker_path);
    drop(marker);
    if removed || fs::remove_dir(dir).is_ok() {
        Sweep::Removed
    } else {
        Sweep::Failed
    }
}

/// Empties and removes the directory holding `marker_path`, unlinking the marker last.
/// The caller must hold the marker's exclusive lock.
pub(crate) fn remove_staging_dir(marker_path: &Path) -> bool {
    let Some(dir) = marker_path.parent() else {
        return false;
    };
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path != marker_path {
                let _ = fs::remove_file(path);
            }
        }
    }
    let _ = fs::remove_file(marker_path);
    fs::remove_dir(dir).is_ok()
}
