//! Purpose: End-to-end coverage of the memoized load sequence with a recording linker.
//! Exports: Integration tests only.
//! Role: Verify idempotence, failure caching, and attempt ordering through the public API.
//! Invariants: Tests never call the real dynamic loader; all staging happens in temp dirs.

mod support;

use std::fs;

use brotli_loader::api::{
    Attempt, ErrorKind, LoadState, Loader, MemoryResources, Origin, PlatformAxis,
    PlatformInputs, Strictness,
};
use support::{
    LIBRARY_BYTES, RecordingLinker, entries, linux_config, linux_resources, sha256, staging_dir,
};

#[test]
fn second_call_returns_cached_outcome_without_io() {
    let temp = tempfile::tempdir().expect("tempdir");
    let loader = Loader::with_parts(
        linux_config(temp.path()),
        RecordingLinker::extracted_only(),
        linux_resources(),
    );

    assert!(loader.ensure_loaded());
    let opened = loader.linker().opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].sha256, sha256(LIBRARY_BYTES));
    assert!(opened[0].lock_present);

    let staging = staging_dir(temp.path());
    assert_eq!(
        loader.state(),
        LoadState {
            attempted: true,
            succeeded: true,
            staging_dir: Some(staging.clone()),
        }
    );

    // Wipe the staging dir; a repeat call must not recreate it.
    fs::remove_dir_all(&staging).expect("remove staging");
    assert!(loader.ensure_loaded());
    assert!(loader.try_load().is_ok());
    assert_eq!(loader.linker().opened().len(), 1);
    assert!(!staging.exists());
}

#[test]
fn extracted_library_is_removed_and_lock_outlives_the_load() {
    let temp = tempfile::tempdir().expect("tempdir");
    let loader = Loader::with_parts(
        linux_config(temp.path()),
        RecordingLinker::extracted_only(),
        linux_resources(),
    );

    let library = loader.try_load().expect("load");
    let staging = staging_dir(temp.path());
    match library.origin() {
        Origin::Extracted {
            staging_dir,
            library_path,
        } => {
            assert_eq!(staging_dir, staging);
            assert_eq!(library_path, staging.join("libbrotli.so"));
        }
        Origin::SystemPath => panic!("expected extracted origin"),
    }

    // Unix lets a loaded file be unlinked, so only the marker and the write gate remain.
    #[cfg(unix)]
    assert_eq!(
        entries(&staging),
        vec![
            staging.join("libbrotli.so.extract"),
            staging.join("libbrotli.so.lock"),
        ]
    );

    // Sole holder: dropping the loader takes the whole staging directory with it.
    drop(loader);
    assert!(!staging.exists());
}

#[test]
fn failed_load_is_cached_and_not_retried() {
    let temp = tempfile::tempdir().expect("tempdir");
    let loader = Loader::with_parts(
        linux_config(temp.path()),
        RecordingLinker::rejecting(),
        linux_resources(),
    );

    let err = loader.try_load().expect_err("rejected");
    assert_eq!(err.kind(), ErrorKind::NativeLoadFailed);
    assert!(!loader.ensure_loaded());
    assert!(loader.try_load().is_err());
    assert_eq!(loader.linker().opened().len(), 1);
    assert_eq!(
        loader.state(),
        LoadState {
            attempted: true,
            succeeded: false,
            staging_dir: None,
        }
    );

    // Neither the rejected copy nor its marker are left behind.
    assert!(entries(temp.path()).is_empty());
}

#[test]
fn missing_resource_leaves_no_staging_directory() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = linux_config(temp.path()).with_platform(PlatformInputs::new("Linux", "x86"));
    let loader = Loader::with_parts(config, RecordingLinker::extracted_only(), linux_resources());

    let err = loader.try_load().expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::LibraryResourceMissing);
    assert_eq!(err.resource(), Some("/lib/linux-x86/libbrotli.so"));
    assert!(entries(temp.path()).is_empty());
    assert!(loader.linker().opened().is_empty());
}

#[test]
fn unsupported_platform_is_strict_by_default() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = linux_config(temp.path()).with_platform(PlatformInputs::new("Linux", "riscv64"));
    let loader = Loader::with_parts(config, RecordingLinker::extracted_only(), linux_resources());

    let err = loader.try_load().expect_err("strict");
    assert_eq!(err.kind(), ErrorKind::UnsupportedPlatform);
    assert_eq!(err.axis(), Some(PlatformAxis::Arch));
    assert!(entries(temp.path()).is_empty());
}

#[test]
fn permissive_mode_looks_up_raw_platform_name() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = linux_config(temp.path())
        .with_platform(PlatformInputs::new("Linux", "riscv64"))
        .with_strictness(Strictness::Permissive);
    let resources = MemoryResources::new().with("/lib/linux-riscv64/libbrotli.so", LIBRARY_BYTES);
    let loader = Loader::with_parts(config, RecordingLinker::extracted_only(), resources);

    assert!(loader.ensure_loaded());
}

#[test]
fn system_path_failure_falls_through_to_extraction() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = linux_config(temp.path()).with_attempts([Attempt::SystemPath, Attempt::Extracted]);
    let loader = Loader::with_parts(config, RecordingLinker::extracted_only(), linux_resources());

    assert!(loader.ensure_loaded());
    assert_eq!(loader.linker().system_calls(), 1);
    assert_eq!(loader.linker().opened().len(), 1);
}

#[test]
fn system_path_success_never_stages() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = linux_config(temp.path()).with_attempts([Attempt::SystemPath, Attempt::Extracted]);
    let linker = RecordingLinker {
        system_available: true,
        ..RecordingLinker::default()
    };
    let loader = Loader::with_parts(config, linker, linux_resources());

    let library = loader.try_load().expect("load");
    assert_eq!(library.origin(), Origin::SystemPath);
    assert!(library.staging_dir().is_none());
    assert!(loader.linker().opened().is_empty());
    assert!(entries(temp.path()).is_empty());
}
