//! Purpose: Resolve the Brotli C entry points from a loaded library handle.
//! Exports: `BrotliApi`, `BrotliVersion`.
//! Role: Proves the loaded module is a Brotli build and hands out its function table.
//! Invariants: Symbols borrow the `Library`; the table cannot outlive the handle.
//! Invariants: A missing symbol is `NativeLoadFailed`, naming the symbol.

use std::fmt;

use libloading::{Library, Symbol};

use crate::core::error::{Error, ErrorKind};

type VersionFn = unsafe extern "C" fn() -> u32;

const ENCODER_VERSION: &[u8] = b"BrotliEncoderVersion\0";
const DECODER_VERSION: &[u8] = b"BrotliDecoderVersion\0";

/// Brotli packs versions as `major << 24 | minor << 12 | patch`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct BrotliVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl BrotliVersion {
    pub fn from_packed(packed: u32) -> Self {
        Self {
            major: packed >> 24,
            minor: (packed >> 12) & 0xfff,
            patch: packed & 0xfff,
        }
    }
}

impl fmt::Display for BrotliVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

pub struct BrotliApi<'lib> {
    encoder_version: Symbol<'lib, VersionFn>,
    decoder_version: Symbol<'lib, VersionFn>,
}

impl<'lib> BrotliApi<'lib> {
    pub fn resolve(library: &'lib Library) -> Result<Self, Error> {
        Ok(Self {
            encoder_version: symbol(library, ENCODER_VERSION)?,
            decoder_version: symbol(library, DECODER_VERSION)?,
        })
    }

    pub fn encoder_version(&self) -> BrotliVersion {
        // SAFETY: signature matches `uint32_t BrotliEncoderVersion(void)`.
        BrotliVersion::from_packed(unsafe { (self.encoder_version)() })
    }

    pub fn decoder_version(&self) -> BrotliVersion {
        // SAFETY: signature matches `uint32_t BrotliDecoderVersion(void)`.
        BrotliVersion::from_packed(unsafe { (self.decoder_version)() })
    }
}

fn symbol<'lib>(library: &'lib Library, name: &[u8]) -> Result<Symbol<'lib, VersionFn>, Error> {
    // SAFETY: the requested type is the documented C signature for these exports.
    unsafe { library.get::<VersionFn>(name) }.map_err(|err| {
        let printable = String::from_utf8_lossy(name.strip_suffix(b"\0").unwrap_or(name));
        Error::new(ErrorKind::NativeLoadFailed)
            .with_message(format!("library does not export {printable}"))
            .with_source(err)
    })
}
