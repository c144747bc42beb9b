//! Purpose: Look up packaged native library bytes by `/lib/<tag>/<file>` resource path.
//! Exports: `ResourceSource`, `EmbeddedResources`, `DirResources`, `MemoryResources`.
//! Role: Stands in for archive-embedded resources; the extractor only sees this trait.
//! Invariants: `Ok(None)` means "not packaged"; `Err` means the lookup itself failed.
//! Invariants: `DirResources` never resolves outside its root (`..` and roots are rejected).

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

mod embedded {
    include!(concat!(env!("OUT_DIR"), "/embedded_natives.rs"));
}

pub trait ResourceSource: Send + Sync {
    fn fetch(&self, path: &str) -> io::Result<Option<Cow<'_, [u8]>>>;
}

/// Libraries compiled into the crate by the build script.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedResources;

impl EmbeddedResources {
    pub fn paths(&self) -> impl Iterator<Item = &'static str> {
        embedded::EMBEDDED.iter().map(|(path, _)| *path)
    }
}

impl ResourceSource for EmbeddedResources {
    fn fetch(&self, path: &str) -> io::Result<Option<Cow<'_, [u8]>>> {
        Ok(embedded::EMBEDDED
            .iter()
            .find(|(key, _)| *key == path)
            .map(|(_, bytes)| Cow::Borrowed(*bytes)))
    }
}

/// Libraries laid out on disk as `<root>/lib/<tag>/<file>`.
#[derive(Clone, Debug)]
pub struct DirResources {
    root: PathBuf,
}

impl DirResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn local_path(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(resolved)
    }
}

impl ResourceSource for DirResources {
    fn fetch(&self, path: &str) -> io::Result<Option<Cow<'_, [u8]>>> {
        let Some(local) = self.local_path(path) else {
            return Ok(None);
        };
        match fs::read(&local) {
            Ok(bytes) => Ok(Some(Cow::Owned(bytes))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryResources {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(path.into(), bytes.into());
    }
}

impl ResourceSource for MemoryResources {
    fn fetch(&self, path: &str) -> io::Result<Option<Cow<'_, [u8]>>> {
        Ok(self
            .entries
            .get(path)
            .map(|bytes| Cow::Borrowed(bytes.as_slice())))
    }
}
