//! Purpose: Abstract the host dynamic-load primitive behind a small trait.
//! Exports: `Linker`, `DlLinker`.
//! Role: Seam between the loading protocol and `libloading`; tests substitute recording linkers.
//! Invariants: `open_system` uses the platform search path; `open_path` takes an absolute file.
//! Invariants: Failures are reported as `NativeLoadFailed`.

use std::path::Path;

use libloading::Library;

use crate::core::error::{Error, ErrorKind};

pub trait Linker: Send + Sync {
    type Handle: Send + Sync;

    fn open_system(&self, library_name: &str) -> Result<Self::Handle, Error>;
    fn open_path(&self, path: &Path) -> Result<Self::Handle, Error>;
}

/// `dlopen`/`LoadLibrary` via libloading.
#[derive(Clone, Copy, Debug, Default)]
pub struct DlLinker;

impl Linker for DlLinker {
    type Handle = Library;

    fn open_system(&self, library_name: &str) -> Result<Library, Error> {
        let file_name = libloading::library_filename(library_name);
        // SAFETY: loading runs the library's initialisers; callers opt into trusting it.
        unsafe { Library::new(&file_name) }.map_err(|err| {
            Error::new(ErrorKind::NativeLoadFailed)
                .with_message(format!(
                    "{} not found on system library path",
                    file_name.to_string_lossy()
                ))
                .with_source(err)
        })
    }

    fn open_path(&self, path: &Path) -> Result<Library, Error> {
        // SAFETY: as above; the file was staged from the crate's own packaged resources.
        unsafe { Library::new(path) }.map_err(|err| {
            Error::new(ErrorKind::NativeLoadFailed)
                .with_message("dynamic loader rejected extracted library")
                .with_path(path)
                .with_source(err)
        })
    }
}
