//! Purpose: Exercise `Extractor` directly: request validation, stale copies, removal policy.
//! Exports: Integration tests only.
//! Role: Covers the on-disk contract below the memoizing `Loader`.
//! Invariants: Rejected requests leave the temp root untouched.

mod support;

use std::borrow::Cow;
use std::fs;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};

use brotli_loader::api::{
    ErrorKind, Extractor, RemovalPolicy, ResourceSource, clean_abandoned,
};
use support::{
    LIBRARY_BYTES, LINUX_RESOURCE, RecordingLinker, entries, linux_resources, sha256, staging_dir,
};

/// Counts lookups so tests can prove validation happened first.
#[derive(Default)]
struct CountingResources {
    fetches: AtomicUsize,
}

impl ResourceSource for CountingResources {
    fn fetch(&self, _path: &str) -> io::Result<Option<Cow<'_, [u8]>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Cow::Borrowed(LIBRARY_BYTES)))
    }
}

#[test]
fn short_prefix_is_rejected_before_lookup() {
    let temp = tempfile::tempdir().expect("tempdir");
    let resources = CountingResources::default();
    let linker = RecordingLinker::extracted_only();

    let err = Extractor::new(temp.path(), &resources)
        .load(&linker, "ab", LINUX_RESOURCE)
        .expect_err("short prefix");

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(resources.fetches.load(Ordering::SeqCst), 0);
    assert!(entries(temp.path()).is_empty());
}

#[test]
fn relative_resource_path_is_rejected_before_lookup() {
    let temp = tempfile::tempdir().expect("tempdir");
    let resources = CountingResources::default();
    let linker = RecordingLinker::extracted_only();

    let err = Extractor::new(temp.path(), &resources)
        .load(&linker, "brotli-loader", "lib/linux-x86-amd64/libbrotli.so")
        .expect_err("relative path");

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(err.resource(), Some("lib/linux-x86-amd64/libbrotli.so"));
    assert_eq!(resources.fetches.load(Ordering::SeqCst), 0);
    assert!(entries(temp.path()).is_empty());
}

#[test]
fn short_file_name_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    let resources = CountingResources::default();
    let linker = RecordingLinker::extracted_only();

    let err = Extractor::new(temp.path(), &resources)
        .load(&linker, "brotli-loader", "/lib/linux-x86-amd64/br")
        .expect_err("short name");

    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(resources.fetches.load(Ordering::SeqCst), 0);
    assert!(entries(temp.path()).is_empty());
}

#[test]
fn stale_copy_from_previous_run_is_replaced() {
    let temp = tempfile::tempdir().expect("tempdir");
    let staging = staging_dir(temp.path());
    fs::create_dir_all(&staging).expect("mkdir");
    fs::write(staging.join("libbrotli.so"), b"truncated write from a crash").expect("seed");

    let resources = linux_resources();
    let linker = RecordingLinker::extracted_only();
    let extraction = Extractor::new(temp.path(), &resources)
        .with_version_tag("9.9.9")
        .load(&linker, "brotli-loader", LINUX_RESOURCE)
        .expect("load");

    let opened = linker.opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].path, staging.join("libbrotli.so"));
    assert_eq!(opened[0].sha256, sha256(LIBRARY_BYTES));
    assert!(opened[0].lock_present);
    assert_eq!(extraction.staging_dir(), staging);
    assert_eq!(extraction.lock_path(), staging.join("libbrotli.so.lock"));
}

#[test]
fn deferred_removal_keeps_file_until_drop() {
    let temp = tempfile::tempdir().expect("tempdir");
    let resources = linux_resources();
    let linker = RecordingLinker::extracted_only();

    let extraction = Extractor::new(temp.path(), &resources)
        .with_version_tag("9.9.9")
        .with_removal(RemovalPolicy::Deferred)
        .load(&linker, "brotli-loader", LINUX_RESOURCE)
        .expect("load");

    assert!(extraction.library_retained());
    let library_path = extraction.library_path().to_path_buf();
    assert_eq!(fs::read(&library_path).expect("read"), LIBRARY_BYTES);
    assert_eq!(extraction.handle(), &library_path);

    let lock_path = extraction.lock_path().to_path_buf();
    drop(extraction);
    assert!(!library_path.exists());
    assert!(!lock_path.exists());
}

#[test]
fn rejected_library_leaves_nothing_behind() {
    let temp = tempfile::tempdir().expect("tempdir");
    let resources = linux_resources();
    let linker = RecordingLinker::rejecting();

    let err = Extractor::new(temp.path(), &resources)
        .with_version_tag("9.9.9")
        .load(&linker, "brotli-loader", LINUX_RESOURCE)
        .expect_err("rejected");

    assert_eq!(err.kind(), ErrorKind::NativeLoadFailed);
    assert!(entries(temp.path()).is_empty());
}

#[test]
fn dropping_one_holder_keeps_a_shared_directory_alive() {
    let temp = tempfile::tempdir().expect("tempdir");
    let resources = linux_resources();
    let linker = RecordingLinker::extracted_only();
    let extractor = Extractor::new(temp.path(), &resources)
        .with_version_tag("9.9.9")
        .with_removal(RemovalPolicy::Deferred)
        .with_garbage_collection(false);

    let first = extractor
        .load(&linker, "brotli-loader", LINUX_RESOURCE)
        .expect("first load");
    let second = extractor
        .load(&linker, "brotli-loader", LINUX_RESOURCE)
        .expect("second load");
    assert_eq!(first.staging_dir(), second.staging_dir());

    let staging = staging_dir(temp.path());
    drop(first);
    assert!(second.lock_path().exists());
    assert!(second.library_path().exists());

    let report = clean_abandoned(temp.path(), "brotli-loader", "libbrotli.so");
    assert!(report.removed.is_empty());
    assert_eq!(report.in_use, vec![staging.clone()]);
    assert!(second.lock_path().exists());
    assert_eq!(fs::read(second.library_path()).expect("read"), LIBRARY_BYTES);

    drop(second);
    assert!(!staging.exists());
}
