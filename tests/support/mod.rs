// Shared fixtures: a recording linker and loader configs rooted in a temp dir.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use brotli_loader::api::{
    Attempt, Error, ErrorKind, Linker, LoaderConfig, MemoryResources, PlatformInputs,
};
use sha2::{Digest, Sha256};

pub const LINUX_RESOURCE: &str = "/lib/linux-x86-amd64/libbrotli.so";
pub const LIBRARY_BYTES: &[u8] = b"\x7fELF pretend brotli build 1.1.0";

/// What the linker saw when asked to open an extracted file.
#[derive(Clone, Debug)]
pub struct Opened {
    pub path: PathBuf,
    pub sha256: [u8; 32],
    pub lock_present: bool,
}

/// Linker that never touches the real dynamic loader.
#[derive(Default)]
pub struct RecordingLinker {
    pub system_available: bool,
    pub reject_extracted: bool,
    pub system_calls: AtomicUsize,
    pub opened: Mutex<Vec<Opened>>,
}

impl RecordingLinker {
    pub fn extracted_only() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            reject_extracted: true,
            ..Self::default()
        }
    }

    pub fn system_calls(&self) -> usize {
        self.system_calls.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> Vec<Opened> {
        self.opened.lock().expect("opened lock").clone()
    }
}

impl Linker for RecordingLinker {
    type Handle = PathBuf;

    fn open_system(&self, library_name: &str) -> Result<PathBuf, Error> {
        self.system_calls.fetch_add(1, Ordering::SeqCst);
        if self.system_available {
            Ok(PathBuf::from(library_name))
        } else {
            Err(Error::new(ErrorKind::NativeLoadFailed).with_message("not on system path"))
        }
    }

    fn open_path(&self, path: &Path) -> Result<PathBuf, Error> {
        let bytes = fs::read(path).map_err(|err| {
            Error::new(ErrorKind::NativeLoadFailed)
                .with_path(path)
                .with_source(err)
        })?;
        let lock_present = path.with_file_name(format!(
            "{}.lock",
            path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
        ))
        .exists();
        self.opened.lock().expect("opened lock").push(Opened {
            path: path.to_path_buf(),
            sha256: sha256(&bytes),
            lock_present,
        });
        if self.reject_extracted {
            return Err(Error::new(ErrorKind::NativeLoadFailed)
                .with_message("invalid ELF header")
                .with_path(path));
        }
        Ok(path.to_path_buf())
    }
}

pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

pub fn linux_resources() -> MemoryResources {
    MemoryResources::new().with(LINUX_RESOURCE, LIBRARY_BYTES)
}

/// Extraction-only config for a fixed linux/x86_64 host under `temp_root`.
pub fn linux_config(temp_root: &Path) -> LoaderConfig {
    LoaderConfig::new()
        .with_temp_root(temp_root)
        .with_version_tag("9.9.9")
        .with_platform(PlatformInputs::new("Linux", "amd64"))
        .with_attempts([Attempt::Extracted])
}

pub fn staging_dir(temp_root: &Path) -> PathBuf {
    temp_root.join("brotli-loader-9.9.9-libbrotli")
}

pub fn entries(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map(|entries| entries.flatten().map(|entry| entry.path()).collect())
        .unwrap_or_default();
    paths.sort();
    paths
}
