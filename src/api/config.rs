//! Purpose: Describe how a `Loader` finds, stages and loads the native library.
//! Exports: `LoaderConfig`, `Attempt`, environment variable names.
//! Role: Single place for defaults and environment overrides; no config files.
//! Invariants: Defaults are strict platform resolution, system path before extraction,
//! Invariants: automatic removal of the staged file, and garbage collection enabled.
//! Invariants: Environment parsing goes through a lookup function so it can be tested purely.

use std::path::PathBuf;

use crate::core::extract::RemovalPolicy;
use crate::core::platform::{PlatformInputs, Strictness};

pub const DEFAULT_LIBRARY_NAME: &str = "brotli";
pub const DEFAULT_DIR_PREFIX: &str = "brotli-loader";

pub const ENV_TMPDIR: &str = "BROTLI_LOADER_TMPDIR";
pub const ENV_PLATFORM_MODE: &str = "BROTLI_LOADER_PLATFORM_MODE";
pub const ENV_SKIP_SYSTEM: &str = "BROTLI_LOADER_SKIP_SYSTEM";
pub const ENV_KEEP_ABANDONED: &str = "BROTLI_LOADER_KEEP_ABANDONED";
pub const ENV_OS: &str = "BROTLI_LOADER_OS";
pub const ENV_ARCH: &str = "BROTLI_LOADER_ARCH";

/// One tier of the load sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Attempt {
    /// Ask the host dynamic loader for the library by name.
    SystemPath,
    /// Extract the packaged copy for this platform and load it from disk.
    Extracted,
}

#[derive(Clone, Debug)]
pub struct LoaderConfig {
    pub library_name: String,
    pub dir_prefix: String,
    pub version_tag: String,
    pub temp_root: PathBuf,
    pub platform: PlatformInputs,
    pub strictness: Strictness,
    pub attempts: Vec<Attempt>,
    pub removal: RemovalPolicy,
    pub collect_abandoned: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            library_name: DEFAULT_LIBRARY_NAME.to_string(),
            dir_prefix: DEFAULT_DIR_PREFIX.to_string(),
            version_tag: env!("CARGO_PKG_VERSION").to_string(),
            temp_root: std::env::temp_dir(),
            platform: PlatformInputs::host(),
            strictness: Strictness::Strict,
            attempts: vec![Attempt::SystemPath, Attempt::Extracted],
            removal: RemovalPolicy::Auto,
            collect_abandoned: true,
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(dir) = lookup(ENV_TMPDIR).filter(|value| !value.is_empty()) {
            config.temp_root = PathBuf::from(dir);
        }
        if let Some(mode) = lookup(ENV_PLATFORM_MODE) {
            match mode.trim().to_ascii_lowercase().as_str() {
                "permissive" => config.strictness = Strictness::Permissive,
                "strict" => config.strictness = Strictness::Strict,
                other => tracing::warn!(value = other, "ignoring unknown {ENV_PLATFORM_MODE}"),
            }
        }
        if lookup(ENV_SKIP_SYSTEM).is_some_and(|value| is_truthy(&value)) {
            config.attempts.retain(|attempt| *attempt != Attempt::SystemPath);
        }
        if lookup(ENV_KEEP_ABANDONED).is_some_and(|value| is_truthy(&value)) {
            config.collect_abandoned = false;
        }
        if let Some(os) = lookup(ENV_OS) {
            config.platform.os_name = os;
        }
        if let Some(arch) = lookup(ENV_ARCH) {
            config.platform.arch_name = arch;
        }
        config
    }

    pub fn with_library_name(mut self, name: impl Into<String>) -> Self {
        self.library_name = name.into();
        self
    }

    pub fn with_dir_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.dir_prefix = prefix.into();
        self
    }

    pub fn with_version_tag(mut self, version_tag: impl Into<String>) -> Self {
        self.version_tag = version_tag.into();
        self
    }

    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = temp_root.into();
        self
    }

    pub fn with_platform(mut self, platform: PlatformInputs) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn with_attempts(mut self, attempts: impl Into<Vec<Attempt>>) -> Self {
        self.attempts = attempts.into();
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
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
