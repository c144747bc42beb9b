//! Purpose: Release lock markers (and the staging directory behind them) on drop or at exit.
//! Exports: `RemoveOnExit`, `run_pending`.
//! Role: Scoped replacement for "delete on exit"; backs lock markers and deferred library copies.
//! Invariants: Every registered marker is held with a shared `fs2` lock until it is released.
//! Invariants: Only the last holder, i.e. one whose exclusive lock succeeds on a marker its path
//! Invariants: still names, empties and removes the staging directory.
//! Invariants: The shutdown hook is installed at most once per process (`libc::atexit`).
//! Invariants: Removal failures are ignored; a leftover file is reclaimed by garbage collection.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, Once};

use fs2::FileExt;

use crate::core::cleanup::remove_staging_dir;
use crate::core::staging::marker_is_current;

static PENDING: Mutex<Vec<(u64, Claim)>> = Mutex::new(Vec::new());
static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static INSTALL_HOOK: Once = Once::new();

fn pending() -> MutexGuard<'static, Vec<(u64, Claim)>> {
    PENDING.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

extern "C" fn remove_pending_at_exit() {
    run_pending();
}

fn install_hook() {
    INSTALL_HOOK.call_once(|| {
        #[cfg(any(unix, windows))]
        {
            // SAFETY: the callback is a plain `extern "C" fn` that never unwinds across the boundary.
            let rc = unsafe { libc::atexit(remove_pending_at_exit) };
            if rc != 0 {
                tracing::debug!("atexit registration failed; pending removals rely on drop");
            }
        }
    });
}

/// Releases every claim still registered. Returns how many were the last holder.
pub fn run_pending() -> usize {
    let claims = std::mem::take(&mut *pending());
    claims
        .into_iter()
        .map(|(_, claim)| claim.release())
        .filter(|released| *released)
        .count()
}

/// One holder's share of a lock marker.
#[derive(Debug)]
pub(crate) struct Claim {
    marker_path: PathBuf,
    marker: File,
}

impl Claim {
    /// `marker` must already carry a shared lock.
    pub(crate) fn new(marker_path: PathBuf, marker: File) -> Self {
        Self {
            marker_path,
            marker,
        }
    }

    fn release(self) -> bool {
        let _ = FileExt::unlock(&self.marker);
        if self.marker.try_lock_exclusive().is_err() {
            tracing::debug!(marker = %self.marker_path.display(), "marker still shared; leaving files");
            return false;
        }
        if !marker_is_current(&self.marker, &self.marker_path) {
            return false;
        }
        // Newcomers blocked on the marker see it unlinked and start over.
        let mut removed = remove_staging_dir(&self.marker_path);
        drop(self.marker);
        if !removed {
            // Windows keeps a delete-pending marker until its last handle closes.
            if let Some(dir) = self.marker_path.parent() {
                removed = std::fs::remove_dir(dir).is_ok();
            }
        }
        tracing::debug!(marker = %self.marker_path.display(), removed, "released last claim");
        true
    }
}

/// Guard over a registered [`Claim`]. Dropping it releases the claim.
#[derive(Debug)]
pub struct RemoveOnExit {
    id: u64,
    path: PathBuf,
}

impl RemoveOnExit {
    pub(crate) fn register(claim: Claim) -> Self {
        install_hook();
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let path = claim.marker_path.clone();
        pending().push((id, claim));
        Self { id, path }
    }

    /// The lock marker this guard holds.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RemoveOnExit {
    fn drop(&mut self) {
        let claim = {
            let mut pending = pending();
            pending
                .iter()
                .position(|(id, _)| *id == self.id)
                .map(|index| pending.swap_remove(index).1)
        };
        if let Some(claim) = claim {
            claim.release();
        }
    }
}
