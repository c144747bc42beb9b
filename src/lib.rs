//! Purpose: Obtain a working, callable instance of the native Brotli shared library.
//! Exports: `api` (loader, platform resolution, extraction, cleanup, errors).
//! Role: Library backing the `brotli-loader` diagnostic CLI and downstream bindings.
//! Invariants: No implicit globals; load state lives in caller-owned `api::Loader` values.
//! Invariants: Only the exit-removal registry is process-wide, because process exit is.
pub mod api;
mod core;
