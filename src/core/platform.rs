//! Purpose: Classify free-form OS and CPU architecture strings into a canonical platform tag.
//! Exports: `Os`, `Arch`, `PlatformTag`, `Strictness`, `PlatformInputs`, `resolve`.
//! Role: Selects which prebuilt native library variant the extractor looks for.
//! Invariants: Pure and deterministic; inputs are lowercased before matching.
//! Invariants: Pattern lists are ordered and the first match wins (x86_64 is tested before x86).
//! Invariants: Strict mode fails with `UnsupportedPlatform` naming the axis; permissive mode
//! Invariants: passes the lowercased raw string through as the tag component.

use std::fmt;

use crate::core::error::{Error, ErrorKind, PlatformAxis};

const LINUX_PATTERNS: &[&str] = &["linux"];
const WINDOWS_PATTERNS: &[&str] = &["windows", "win32"];
const MACOS_PATTERNS: &[&str] = &["mac os x", "macos", "darwin", "osx"];

const X86_64_PATTERNS: &[&str] = &["x86_64", "amd64", "em64t", "x64", "universal"];
const X86_PATTERNS: &[&str] = &["x86", "i386", "i486", "i586", "i686", "pentium"];
const ARM_HF_PATTERNS: &[&str] = &["arm"];

const PERMISSIVE_HINT: &str =
    "Set BROTLI_LOADER_PLATFORM_MODE=permissive to look up the raw platform name instead.";

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Os {
    Linux,
    Windows,
    MacOs,
    Unknown(String),
}

impl Os {
    pub fn name(&self) -> &str {
        match self {
            Os::Linux => "linux",
            Os::Windows => "win32",
            Os::MacOs => "darwin",
            Os::Unknown(raw) => raw,
        }
    }

    fn classify(normalized: &str) -> Option<Self> {
        if matches_any(normalized, LINUX_PATTERNS) {
            return Some(Os::Linux);
        }
        if matches_any(normalized, WINDOWS_PATTERNS) {
            return Some(Os::Windows);
        }
        if matches_any(normalized, MACOS_PATTERNS) {
            return Some(Os::MacOs);
        }
        None
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    ArmHardFloat,
    Unknown(String),
}

impl Arch {
    pub fn name(&self) -> &str {
        match self {
            Arch::X86 => "x86",
            Arch::X86_64 => "x86-amd64",
            Arch::ArmHardFloat => "arm32-vfp-hflt",
            Arch::Unknown(raw) => raw,
        }
    }

    fn classify(normalized: &str) -> Option<Self> {
        if matches_any(normalized, X86_64_PATTERNS) {
            return Some(Arch::X86_64);
        }
        if matches_any(normalized, X86_PATTERNS) {
            return Some(Arch::X86);
        }
        if matches_any(normalized, ARM_HF_PATTERNS) {
            return Some(Arch::ArmHardFloat);
        }
        None
    }
}

fn matches_any(value: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|pattern| value.contains(pattern))
}

/// How unrecognized OS or architecture strings are treated.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Strictness {
    #[default]
    Strict,
    Permissive,
}

/// The two host-reported strings the resolver works from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlatformInputs {
    pub os_name: String,
    pub arch_name: String,
}

impl PlatformInputs {
    pub fn new(os_name: impl Into<String>, arch_name: impl Into<String>) -> Self {
        Self {
            os_name: os_name.into(),
            arch_name: arch_name.into(),
        }
    }

    pub fn host() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PlatformTag {
    pub os: Os,
    pub arch: Arch,
}

impl PlatformTag {
    /// File name the platform's dynamic linker expects for `library_name`.
    pub fn library_file_name(&self, library_name: &str) -> String {
        match self.os {
            Os::Linux => format!("lib{library_name}.so"),
            Os::MacOs => format!("lib{library_name}.dylib"),
            Os::Windows => format!("{library_name}.dll"),
            Os::Unknown(_) => format!(
                "{}{library_name}{}",
                std::env::consts::DLL_PREFIX,
                std::env::consts::DLL_SUFFIX
            ),
        }
    }

    pub fn resource_path(&self, file_name: &str) -> String {
        format!("/lib/{self}/{file_name}")
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.name(), self.arch.name())
    }
}

pub fn resolve(os_name: &str, arch_name: &str, strictness: Strictness) -> Result<PlatformTag, Error> {
    let os_name = os_name.to_lowercase();
    let arch_name = arch_name.to_lowercase();

    let os = match Os::classify(&os_name) {
        Some(os) => os,
        None if strictness == Strictness::Permissive => Os::Unknown(os_name),
        None => {
            return Err(Error::new(ErrorKind::UnsupportedPlatform)
                .with_message(format!("unsupported operating system: {os_name}"))
                .with_axis(PlatformAxis::Os)
                .with_hint(PERMISSIVE_HINT));
        }
    };
    let arch = match Arch::classify(&arch_name) {
        Some(arch) => arch,
        None if strictness == Strictness::Permissive => Arch::Unknown(arch_name),
        None => {
            return Err(Error::new(ErrorKind::UnsupportedPlatform)
                .with_message(format!("unsupported architecture: {arch_name}"))
                .with_axis(PlatformAxis::Arch)
                .with_hint(PERMISSIVE_HINT));
        }
    };

    Ok(PlatformTag { os, arch })
}
