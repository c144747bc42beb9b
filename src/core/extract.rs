//! Purpose: Stage a packaged native library on disk, load it, and reclaim stale copies.
//! Exports: `Extractor`, `Extraction`, `RemovalPolicy`, `write_library`, `StagedFile`.
//! Role: The extracted-path half of the two-tier load; used directly or through `Loader`.
//! Invariants: Validation, then resource lookup, then the first filesystem mutation.
//! Invariants: The staged file is replaced atomically (temp file + rename) unless its
//! Invariants: SHA-256 already matches the resource, so readers never see a partial copy.
//! Invariants: Every holder keeps a shared lock on the marker; write+load is serialised by an
//! Invariants: exclusive lock on the sibling gate file.
//! Invariants: Garbage collection runs only after a successful load and never fails it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::core::cleanup::{CleanupReport, clean_abandoned};
use crate::core::error::{Error, ErrorKind};
use crate::core::exit_hooks::RemoveOnExit;
use crate::core::linker::Linker;
use crate::core::resources::ResourceSource;
use crate::core::staging::{Staging, staging_dir_name, validate_request};

/// What happens to the extracted file once the library is loaded.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RemovalPolicy {
    /// Remove right away when the host allows unlinking a loaded file, otherwise defer.
    #[default]
    Auto,
    /// Keep the file until the last holder of the staging directory lets go.
    Deferred,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagedFile {
    pub path: PathBuf,
    pub sha256: [u8; 32],
    pub rewritten: bool,
}

/// Writes `bytes` to `dir/file_name`, replacing whatever is there unless it is identical.
pub fn write_library(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<StagedFile, Error> {
    let path = dir.join(file_name);
    let sha256: [u8; 32] = Sha256::digest(bytes).into();

    if let Ok(existing) = fs::read(&path) {
        let existing_sha: [u8; 32] = Sha256::digest(&existing).into();
        if existing_sha == sha256 {
            return Ok(StagedFile {
                path,
                sha256,
                rewritten: false,
            });
        }
    }

    let extraction_error = |err: std::io::Error| {
        Error::new(ErrorKind::ExtractionFailed)
            .with_message("failed to write extracted library")
            .with_path(&path)
            .with_source(err)
    };

    // Dropping `temp` on any error path deletes the partial copy.
    let mut temp = NamedTempFile::new_in(dir).map_err(extraction_error)?;
    temp.write_all(bytes).map_err(extraction_error)?;
    temp.as_file().sync_all().map_err(extraction_error)?;
    temp.persist(&path).map_err(|err| extraction_error(err.error))?;

    Ok(StagedFile {
        path,
        sha256,
        rewritten: true,
    })
}

/// A library loaded from a staged copy, plus the files it keeps alive.
#[derive(Debug)]
pub struct Extraction<H> {
    // Declared first so the library is released before its files are removed.
    handle: H,
    staging_dir: PathBuf,
    library_path: PathBuf,
    library_retained: bool,
    // Last holder to drop its marker removes the staging directory.
    lock_marker: RemoveOnExit,
    cleanup: CleanupReport,
}

impl<H> Extraction<H> {
    pub fn handle(&self) -> &H {
        &self.handle
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    pub fn lock_path(&self) -> &Path {
        self.lock_marker.path()
    }

    /// Whether the extracted file was left on disk for removal with the staging directory.
    pub fn library_retained(&self) -> bool {
        self.library_retained
    }

    pub fn cleanup(&self) -> &CleanupReport {
        &self.cleanup
    }
}

pub struct Extractor<'a> {
    temp_root: PathBuf,
    version_tag: String,
    resources: &'a dyn ResourceSource,
    removal: RemovalPolicy,
    collect_abandoned: bool,
}

impl<'a> Extractor<'a> {
    pub fn new(temp_root: impl Into<PathBuf>, resources: &'a dyn ResourceSource) -> Self {
        Self {
            temp_root: temp_root.into(),
            version_tag: env!("CARGO_PKG_VERSION").to_string(),
            resources,
            removal: RemovalPolicy::default(),
            collect_abandoned: true,
        }
    }

    pub fn with_version_tag(mut self, version_tag: impl Into<String>) -> Self {
        self.version_tag = version_tag.into();
        self
    }

    pub fn with_removal(mut self, removal: RemovalPolicy) -> Self {
        self.removal = removal;
        self
    }

    pub fn with_garbage_collection(mut self, enabled: bool) -> Self {
        self.collect_abandoned = enabled;
        self
    }

    pub fn load<L: Linker>(
        &self,
        linker: &L,
        prefix: &str,
        resource_path: &str,
    ) -> Result<Extraction<L::Handle>, Error> {
        let file_name = validate_request(prefix, resource_path)?;

        let bytes = self
            .resources
            .fetch(resource_path)
            .map_err(|err| {
                Error::new(ErrorKind::ExtractionFailed)
                    .with_message("failed to read packaged library")
                    .with_resource(resource_path)
                    .with_source(err)
            })?
            .ok_or_else(|| {
                Error::new(ErrorKind::LibraryResourceMissing)
                    .with_message("no packaged library for this platform")
                    .with_resource(resource_path)
            })?;

        let dir_name = staging_dir_name(prefix, &self.version_tag, file_name);
        let staging = Staging::prepare(&self.temp_root, &dir_name, file_name)?;
        let gate = staging.lock_extraction()?;

        let loaded = write_library(staging.dir(), file_name, &bytes).and_then(|staged| {
            tracing::debug!(
                path = %staged.path.display(),
                rewritten = staged.rewritten,
                "library staged"
            );
            linker.open_path(&staged.path).map(|handle| (handle, staged))
        });

        let (handle, staged) = match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                drop(gate);
                // The last holder out empties the directory, rejected copy included.
                drop(staging);
                return Err(err);
            }
        };

        // Still under the gate, so a peer never sees the file vanish between write and load.
        let library_retained = !self.release_library_file(&staged.path);
        drop(gate);
        let staging_dir = staging.dir().to_path_buf();
        let lock_marker = staging.into_marker();

        let cleanup = if self.collect_abandoned {
            clean_abandoned(&self.temp_root, prefix, file_name)
        } else {
            CleanupReport::default()
        };

        Ok(Extraction {
            handle,
            staging_dir,
            library_path: staged.path,
            library_retained,
            lock_marker,
            cleanup,
        })
    }

    /// Returns whether the file is gone; a kept file goes with the staging directory.
    fn release_library_file(&self, path: &Path) -> bool {
        if self.removal != RemovalPolicy::Auto {
            return false;
        }
        match fs::remove_file(path) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "loaded library is pinned; deferring removal");
                false
            }
        }
    }
}
