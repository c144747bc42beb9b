// Core modules implementing platform resolution, staging, loading and cleanup.
pub mod cleanup;
pub mod error;
pub mod exit_hooks;
pub mod extract;
pub mod linker;
pub mod platform;
pub mod resources;
pub mod staging;
