//! Purpose: Define the public Rust API for obtaining a callable native Brotli library.
//! Exports: Loader, configuration, platform resolution, extraction and cleanup primitives.
//! Role: Public, additive-only surface over the internal `core` modules.
//! Invariants: Staging, cleanup and linker types reach callers only through these re-exports.
//! Invariants: Additions here must not change the on-disk naming of existing staging dirs.

mod brotli;
mod config;
mod loader;

pub use crate::core::cleanup::{CleanupReport, clean_abandoned};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind, PlatformAxis};
pub use crate::core::exit_hooks::{RemoveOnExit, run_pending};
pub use crate::core::extract::{Extraction, Extractor, RemovalPolicy, StagedFile, write_library};
pub use crate::core::linker::{DlLinker, Linker};
pub use crate::core::platform::{Arch, Os, PlatformInputs, PlatformTag, Strictness, resolve};
pub use crate::core::resources::{DirResources, EmbeddedResources, MemoryResources, ResourceSource};
pub use crate::core::staging::{
    MIN_NAME_LEN, gate_file_name, lock_file_name, staging_dir_name, validate_request,
};
pub use brotli::{BrotliApi, BrotliVersion};
pub use config::{
    Attempt, DEFAULT_DIR_PREFIX, DEFAULT_LIBRARY_NAME, ENV_ARCH, ENV_KEEP_ABANDONED, ENV_OS,
    ENV_PLATFORM_MODE, ENV_SKIP_SYSTEM, ENV_TMPDIR, LoaderConfig,
};
pub use loader::{LoadState, Loader, NativeLibrary, Origin};
