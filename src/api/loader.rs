//! Purpose: Run the ordered load attempts once and memoize the outcome.
//! Exports: `Loader`, `NativeLibrary`, `Origin`, `LoadState`.
//! Role: Caller-owned replacement for a process-wide "library loaded" flag.
//! Invariants: The attempt sequence runs at most once per `Loader`; concurrent first calls
//! Invariants: block on the same `OnceLock` and observe one settled outcome.
//! Invariants: A failed outcome is cached too, never retried, and logged once.
//! Invariants: System-path failures fall through; the last attempt's error is surfaced.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::Serialize;

use super::config::{Attempt, LoaderConfig};
use crate::core::error::{Error, ErrorKind};
use crate::core::extract::{Extraction, Extractor};
use crate::core::linker::{DlLinker, Linker};
use crate::core::platform::resolve;
use crate::core::resources::{EmbeddedResources, ResourceSource};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Origin {
    SystemPath,
    Extracted {
        staging_dir: PathBuf,
        library_path: PathBuf,
    },
}

#[derive(Debug)]
enum Loaded<H> {
    System(H),
    Extracted(Extraction<H>),
}

/// A loaded native library and whatever on-disk state keeps it valid.
#[derive(Debug)]
pub struct NativeLibrary<H> {
    loaded: Loaded<H>,
}

impl<H> NativeLibrary<H> {
    pub fn handle(&self) -> &H {
        match &self.loaded {
            Loaded::System(handle) => handle,
            Loaded::Extracted(extraction) => extraction.handle(),
        }
    }

    pub fn origin(&self) -> Origin {
        match &self.loaded {
            Loaded::System(_) => Origin::SystemPath,
            Loaded::Extracted(extraction) => Origin::Extracted {
                staging_dir: extraction.staging_dir().to_path_buf(),
                library_path: extraction.library_path().to_path_buf(),
            },
        }
    }

    pub fn staging_dir(&self) -> Option<&Path> {
        match &self.loaded {
            Loaded::System(_) => None,
            Loaded::Extracted(extraction) => Some(extraction.staging_dir()),
        }
    }

    pub fn extraction(&self) -> Option<&Extraction<H>> {
        match &self.loaded {
            Loaded::System(_) => None,
            Loaded::Extracted(extraction) => Some(extraction),
        }
    }
}

/// Snapshot of a loader's memoized outcome.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct LoadState {
    pub attempted: bool,
    pub succeeded: bool,
    pub staging_dir: Option<PathBuf>,
}

pub struct Loader<L: Linker = DlLinker> {
    config: LoaderConfig,
    linker: L,
    resources: Box<dyn ResourceSource>,
    outcome: OnceLock<Result<NativeLibrary<L::Handle>, Error>>,
}

impl Loader<DlLinker> {
    /// Loader over the host dynamic linker and the crate's embedded libraries.
    pub fn new(config: LoaderConfig) -> Self {
        Self::with_parts(config, DlLinker, EmbeddedResources)
    }
}

impl<L: Linker> Loader<L> {
    pub fn with_parts(
        config: LoaderConfig,
        linker: L,
        resources: impl ResourceSource + 'static,
    ) -> Self {
        Self {
            config,
            linker,
            resources: Box::new(resources),
            outcome: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn linker(&self) -> &L {
        &self.linker
    }

    /// Loads the library if no attempt has been made yet; reports availability.
    pub fn ensure_loaded(&self) -> bool {
        self.settle().is_ok()
    }

    /// Like `ensure_loaded`, but surfaces the library or the error that settled the outcome.
    pub fn try_load(&self) -> Result<&NativeLibrary<L::Handle>, &Error> {
        self.settle().as_ref()
    }

    fn settle(&self) -> &Result<NativeLibrary<L::Handle>, Error> {
        self.outcome.get_or_init(|| {
            let outcome = self.run_attempts();
            if let Err(err) = &outcome {
                tracing::warn!(error = %err, "native brotli library unavailable");
            }
            outcome
        })
    }

    pub fn state(&self) -> LoadState {
        match self.outcome.get() {
            None => LoadState::default(),
            Some(Ok(library)) => LoadState {
                attempted: true,
                succeeded: true,
                staging_dir: library.staging_dir().map(Path::to_path_buf),
            },
            Some(Err(_)) => LoadState {
                attempted: true,
                succeeded: false,
                staging_dir: None,
            },
        }
    }

    fn run_attempts(&self) -> Result<NativeLibrary<L::Handle>, Error> {
        let mut last_err = None;
        for attempt in &self.config.attempts {
            let result = match attempt {
                Attempt::SystemPath => self.load_from_system_path(),
                Attempt::Extracted => self.load_extracted(),
            };
            match result {
                Ok(library) => {
                    tracing::info!(origin = ?library.origin(), "native brotli library loaded");
                    return Ok(library);
                }
                Err(err) => {
                    tracing::debug!(?attempt, error = %err, "load attempt failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            Error::new(ErrorKind::InvalidArgument).with_message("no load attempts configured")
        }))
    }

    fn load_from_system_path(&self) -> Result<NativeLibrary<L::Handle>, Error> {
        let handle = self.linker.open_system(&self.config.library_name)?;
        Ok(NativeLibrary {
            loaded: Loaded::System(handle),
        })
    }

    fn load_extracted(&self) -> Result<NativeLibrary<L::Handle>, Error> {
        let inputs = &self.config.platform;
        let platform = resolve(&inputs.os_name, &inputs.arch_name, self.config.strictness)?;
        let file_name = platform.library_file_name(&self.config.library_name);
        let resource_path = platform.resource_path(&file_name);
        tracing::debug!(%platform, resource = %resource_path, "extracting packaged library");

        let extraction = Extractor::new(&self.config.temp_root, self.resources.as_ref())
            .with_version_tag(&self.config.version_tag)
            .with_removal(self.config.removal)
            .with_garbage_collection(self.config.collect_abandoned)
            .load(&self.linker, &self.config.dir_prefix, &resource_path)?;

        Ok(NativeLibrary {
            loaded: Loaded::Extracted(extraction),
        })
    }
}
