//! Purpose: Embed prebuilt native Brotli libraries into the crate as static byte tables.
//! Role: Cargo build-script; scans `resources/lib/<tag>/<file>` and emits `include_bytes!` entries.
//! Invariants: `cargo:rerun-if-changed` covers the resource root and the override variable.
//! Invariants: A missing resource root yields an empty table, never a build failure.
//! Invariants: Entry keys use the `/lib/<tag>/<file>` resource path layout.
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const RESOURCE_DIR_ENV: &str = "BROTLI_LOADER_RESOURCE_DIR";

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));

    println!("cargo:rerun-if-env-changed={RESOURCE_DIR_ENV}");
    let resource_root = env::var_os(RESOURCE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| manifest_dir.join("resources"));
    println!("cargo:rerun-if-changed={}", resource_root.display());

    let entries = collect_entries(&resource_root.join("lib"));
    for (_, path) in &entries {
        println!("cargo:rerun-if-changed={}", path.display());
    }

    let mut source = String::from("pub(crate) static EMBEDDED: &[(&str, &[u8])] = &[\n");
    for (key, path) in &entries {
        source.push_str(&format!(
            "    ({key:?}, include_bytes!({:?})),\n",
            path.display().to_string()
        ));
    }
    source.push_str("];\n");

    fs::write(out_dir.join("embedded_natives.rs"), source)
        .expect("failed to write embedded native table");
}

fn collect_entries(lib_root: &Path) -> Vec<(String, PathBuf)> {
    let mut entries = Vec::new();
    let Ok(platforms) = fs::read_dir(lib_root) else {
        return entries;
    };
    for platform in platforms.flatten() {
        let platform_path = platform.path();
        if !platform_path.is_dir() {
            continue;
        }
        let Some(tag) = platform.file_name().to_str().map(str::to_string) else {
            continue;
        };
        println!("cargo:rerun-if-changed={}", platform_path.display());
        let Ok(files) = fs::read_dir(&platform_path) else {
            continue;
        };
        for file in files.flatten() {
            let file_path = file.path();
            if !file_path.is_file() {
                continue;
            }
            if let Some(name) = file.file_name().to_str() {
                entries.push((format!("/lib/{tag}/{name}"), file_path));
            }
        }
    }
    entries.sort();
    entries
}
