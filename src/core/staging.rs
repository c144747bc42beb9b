//! Purpose: Validate extraction requests and prepare the per-version staging directory.
//! Exports: `MIN_NAME_LEN`, `validate_request`, `staging_dir_name`, `lock_file_name`,
//! Exports: `gate_file_name`, `Staging`.
//! Role: Owns the on-disk naming contract shared by the extractor and garbage collection.
//! Invariants: Validation runs before any lookup or filesystem mutation.
//! Invariants: Staging names start with the caller prefix and are deterministic per
//! Invariants: (prefix, version, library stem), so reruns reuse the same directory.
//! Invariants: Each holder keeps a shared `fs2` lock on the marker for as long as the
//! Invariants: `Staging` value (or its guard) lives; a marker is only trusted once locked
//! Invariants: and confirmed to still be the file its path names.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::core::error::{Error, ErrorKind};
use crate::core::exit_hooks::{Claim, RemoveOnExit};

pub const MIN_NAME_LEN: usize = 3;

// A collector in another process may remove a freshly created directory before our
// marker lands in it; recreate a few times before giving up.
const STAGING_ATTEMPTS: usize = 3;

/// Checks the prefix and resource path, returning the trailing file name.
pub fn validate_request<'a>(prefix: &str, resource_path: &'a str) -> Result<&'a str, Error> {
    if prefix.chars().count() < MIN_NAME_LEN {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_message("temp dir prefix must be at least 3 characters long"));
    }
    if !resource_path.starts_with('/') {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_message("resource path must be absolute (start with '/')")
            .with_resource(resource_path));
    }
    let file_name = resource_path.rsplit('/').next().unwrap_or_default();
    if file_name.chars().count() < MIN_NAME_LEN {
        return Err(Error::new(ErrorKind::InvalidArgument)
            .with_message("library file name must be at least 3 characters long")
            .with_resource(resource_path));
    }
    Ok(file_name)
}

pub fn staging_dir_name(prefix: &str, version: &str, file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name);
    format!("{prefix}-{}-{}", sanitize(version), sanitize(stem))
}

pub fn lock_file_name(file_name: &str) -> String {
    format!("{file_name}.lock")
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sidecar file whose exclusive lock serialises write+load among holders of one marker.
pub fn gate_file_name(file_name: &str) -> String {
    format!("{file_name}.extract")
}

/// Whether `path` still names the file behind `file`; a releasing holder may have unlinked it.
pub(crate) fn marker_is_current(file: &File, path: &Path) -> bool {
    let (Ok(held), Ok(named)) = (file.metadata(), fs::metadata(path)) else {
        return false;
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        held.dev() == named.dev() && held.ino() == named.ino()
    }
    #[cfg(not(unix))]
    {
        // Windows refuses to open a name whose file is pending deletion.
        let _ = (held, named);
        true
    }
}

/// A staging directory with this holder's shared claim on the lock marker.
#[derive(Debug)]
pub struct Staging {
    dir: PathBuf,
    gate_path: PathBuf,
    marker: RemoveOnExit,
}

impl Staging {
    pub fn prepare(temp_root: &Path, dir_name: &str, file_name: &str) -> Result<Self, Error> {
        Self::prepare_with(temp_root, dir_name, file_name, |_| {})
    }

    /// `after_dir` runs between creating the directory and claiming the marker.
    pub(crate) fn prepare_with(
        temp_root: &Path,
        dir_name: &str,
        file_name: &str,
        mut after_dir: impl FnMut(&Path),
    ) -> Result<Self, Error> {
        let dir = temp_root.join(dir_name);
        let lock_path = dir.join(lock_file_name(file_name));

        let mut last_err = None;
        for _ in 0..STAGING_ATTEMPTS {
            ensure_dir(&dir)?;
            after_dir(&dir);
            match claim_marker(&lock_path) {
                Ok(Some(marker)) => {
                    tracing::debug!(dir = %dir.display(), "staging directory ready");
                    return Ok(Self {
                        gate_path: dir.join(gate_file_name(file_name)),
                        marker: RemoveOnExit::register(Claim::new(lock_path, marker)),
                        dir,
                    });
                }
                Ok(None) => {
                    tracing::debug!(dir = %dir.display(), "lock marker released under us; retrying");
                    last_err = Some(io::Error::new(
                        io::ErrorKind::NotFound,
                        "lock marker was replaced",
                    ));
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(dir = %dir.display(), "staging directory vanished; recreating");
                    last_err = Some(err);
                }
                Err(err) => return Err(staging_error(&lock_path, err)),
            }
        }
        Err(staging_error(
            &lock_path,
            last_err.unwrap_or_else(|| io::Error::from(io::ErrorKind::NotFound)),
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock_path(&self) -> &Path {
        self.marker.path()
    }

    /// Blocks until this holder may write and load; the lock lasts until the file is dropped.
    pub fn lock_extraction(&self) -> Result<File, Error> {
        let gate = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.gate_path)
            .map_err(|err| staging_error(&self.gate_path, err))?;
        gate.lock_exclusive().map_err(|err| {
            Error::new(ErrorKind::ExtractionFailed)
                .with_message("failed to lock staging directory")
                .with_path(&self.gate_path)
                .with_source(err)
        })?;
        Ok(gate)
    }

    /// Keeps the claim alive past this value; the returned guard releases it on drop.
    pub fn into_marker(self) -> RemoveOnExit {
        self.marker
    }
}

// Opens (or creates) the marker and takes a shared lock. `None` means the file we locked
// had already been unlinked by its last holder or a collector.
fn claim_marker(lock_path: &Path) -> io::Result<Option<File>> {
    let marker = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)?;
    marker.lock_shared()?;
    if marker_is_current(&marker, lock_path) {
        Ok(Some(marker))
    } else {
        Ok(None)
    }
}

fn ensure_dir(dir: &Path) -> Result<(), Error> {
    fs::create_dir_all(dir).map_err(|err| staging_error(dir, err))?;
    let meta = fs::symlink_metadata(dir).map_err(|err| staging_error(dir, err))?;
    if !meta.is_dir() {
        return Err(Error::new(ErrorKind::ExtractionFailed)
            .with_message("staging path exists and is not a directory")
            .with_path(dir));
    }
    Ok(())
}

fn staging_error(path: &Path, err: io::Error) -> Error {
    Error::new(ErrorKind::ExtractionFailed)
        .with_message("failed to prepare staging directory")
        .with_path(path)
        .with_source(err)
}
