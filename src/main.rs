//! Purpose: `brotli-loader` diagnostic CLI over the loader library.
//! Role: Binary crate root; parses args, runs one command, emits JSON on stdout.
//! Invariants: Errors are emitted on stderr (text on a TTY, JSON otherwise).
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Logging goes to stderr through `tracing`; stdout carries only command output.
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use brotli_loader::api::{
    Attempt, BrotliApi, DirResources, DlLinker, Error, ErrorKind, Loader, LoaderConfig, Origin,
    PlatformInputs, Strictness, clean_abandoned, lock_file_name, resolve, to_exit_code,
};

#[derive(Parser, Debug)]
#[command(
    name = "brotli-loader",
    version,
    about = "Locate, extract and load the native Brotli library",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the platform tag and resource path for this (or a given) host.
    Platform {
        #[command(flatten)]
        platform: PlatformArgs,
    },
    /// Run the full load sequence once and report the outcome.
    Load {
        #[command(flatten)]
        platform: PlatformArgs,
        #[command(flatten)]
        staging: StagingArgs,
        #[arg(long, help = "Skip the system library path and go straight to extraction")]
        skip_system: bool,
        #[arg(
            long,
            help = "Read libraries from <DIR>/lib/<tag>/<file> instead of the embedded set",
            value_hint = ValueHint::DirPath
        )]
        resources: Option<PathBuf>,
        #[arg(long, help = "Leave abandoned staging directories in place")]
        keep_abandoned: bool,
    },
    /// Remove abandoned staging directories without loading anything.
    Clean {
        #[command(flatten)]
        staging: StagingArgs,
        #[arg(long, help = "Library file name whose lock marks a directory in use")]
        library_file: Option<String>,
    },
}

#[derive(Args, Debug)]
struct PlatformArgs {
    #[arg(long, help = "OS name to classify instead of the host's")]
    os: Option<String>,
    #[arg(long, help = "Architecture name to classify instead of the host's")]
    arch: Option<String>,
    #[arg(long, help = "Pass unrecognized OS/arch names through instead of failing")]
    permissive: bool,
}

#[derive(Args, Debug)]
struct StagingArgs {
    #[arg(long, help = "Staging directory prefix (min 3 characters)")]
    prefix: Option<String>,
    #[arg(long, help = "Temp root to stage under", value_hint = ValueHint::DirPath)]
    temp_root: Option<PathBuf>,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(value) => {
            emit_json(value);
            0
        }
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    // exit() skips destructors; release exit-scheduled files first
    brotli_loader::api::run_pending();
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<Value, Error> {
    match cli.command {
        Command::Platform { platform } => {
            let config = apply_platform(LoaderConfig::from_env(), &platform);
            let inputs = &config.platform;
            let tag = resolve(&inputs.os_name, &inputs.arch_name, config.strictness)?;
            let file_name = tag.library_file_name(&config.library_name);
            Ok(json!({
                "platform": tag.to_string(),
                "os": inputs.os_name,
                "arch": inputs.arch_name,
                "library_file": file_name,
                "resource_path": tag.resource_path(&file_name),
            }))
        }
        Command::Load {
            platform,
            staging,
            skip_system,
            resources,
            keep_abandoned,
        } => {
            let config = apply_platform(LoaderConfig::from_env(), &platform);
            let mut config = apply_staging(config, &staging);
            if skip_system {
                config.attempts.retain(|attempt| *attempt != Attempt::SystemPath);
            }
            if keep_abandoned {
                config.collect_abandoned = false;
            }
            let loader = match resources {
                Some(dir) => Loader::with_parts(config, DlLinker, DirResources::new(dir)),
                None => Loader::new(config),
            };
            load_report(&loader)
        }
        Command::Clean {
            staging,
            library_file,
        } => {
            let config = apply_staging(LoaderConfig::from_env(), &staging);
            let file_name = match library_file {
                Some(name) => name,
                None => {
                    let inputs = &config.platform;
                    resolve(&inputs.os_name, &inputs.arch_name, Strictness::Permissive)?
                        .library_file_name(&config.library_name)
                }
            };
            if config.dir_prefix.chars().count() < brotli_loader::api::MIN_NAME_LEN {
                return Err(Error::new(ErrorKind::InvalidArgument)
                    .with_message("temp dir prefix must be at least 3 characters long"));
            }
            let report = clean_abandoned(&config.temp_root, &config.dir_prefix, &file_name);
            Ok(json!({
                "lock_file": lock_file_name(&file_name),
                "cleanup": to_json(&report)?,
            }))
        }
    }
}

fn apply_platform(mut config: LoaderConfig, args: &PlatformArgs) -> LoaderConfig {
    let host = PlatformInputs::host();
    if args.os.is_some() || args.arch.is_some() {
        config.platform = PlatformInputs::new(
            args.os.clone().unwrap_or(host.os_name),
            args.arch.clone().unwrap_or(host.arch_name),
        );
    }
    if args.permissive {
        config.strictness = Strictness::Permissive;
    }
    config
}

fn apply_staging(mut config: LoaderConfig, args: &StagingArgs) -> LoaderConfig {
    if let Some(prefix) = &args.prefix {
        config.dir_prefix = prefix.clone();
    }
    if let Some(temp_root) = &args.temp_root {
        config.temp_root = temp_root.clone();
    }
    config
}

fn load_report(loader: &Loader) -> Result<Value, Error> {
    let library = loader.try_load().map_err(owned_error)?;

    let mut out = Map::new();
    out.insert("state".to_string(), to_json(&loader.state())?);
    match library.origin() {
        Origin::SystemPath => {
            out.insert("origin".to_string(), json!("system-path"));
        }
        Origin::Extracted {
            staging_dir,
            library_path,
        } => {
            out.insert("origin".to_string(), json!("extracted"));
            out.insert(
                "staging_dir".to_string(),
                json!(staging_dir.display().to_string()),
            );
            out.insert(
                "library_path".to_string(),
                json!(library_path.display().to_string()),
            );
        }
    }
    if let Some(extraction) = library.extraction() {
        out.insert("cleanup".to_string(), to_json(extraction.cleanup())?);
    }
    match BrotliApi::resolve(library.handle()) {
        Ok(api) => {
            out.insert(
                "encoder_version".to_string(),
                json!(api.encoder_version().to_string()),
            );
            out.insert(
                "decoder_version".to_string(),
                json!(api.decoder_version().to_string()),
            );
        }
        Err(err) => {
            tracing::warn!(error = %err, "loaded library is missing brotli entry points");
        }
    }
    Ok(Value::Object(out))
}

// The cached error is borrowed; copy its diagnostics into an owned one.
fn owned_error(err: &Error) -> Error {
    let mut owned = Error::new(err.kind());
    if let Some(message) = err.message() {
        owned = owned.with_message(message);
    }
    if let Some(hint) = err.hint() {
        owned = owned.with_hint(hint);
    }
    if let Some(path) = err.path() {
        owned = owned.with_path(path);
    }
    if let Some(resource) = err.resource() {
        owned = owned.with_resource(resource);
    }
    if let Some(axis) = err.axis() {
        owned = owned.with_axis(axis);
    }
    if let Some(source) = std::error::Error::source(err) {
        owned = owned.with_source(io::Error::other(source.to_string()));
    }
    owned
}

fn to_json(value: &impl serde::Serialize) -> Result<Value, Error> {
    serde_json::to_value(value).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("json encode failed")
            .with_source(err)
    })
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("error: {}", error_message(err));
        if let Some(hint) = err.hint() {
            eprintln!("hint: {hint}");
        }
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::InvalidArgument => "invalid argument".to_string(),
        ErrorKind::UnsupportedPlatform => "unsupported platform".to_string(),
        ErrorKind::LibraryResourceMissing => "packaged library missing".to_string(),
        ErrorKind::ExtractionFailed => "extraction failed".to_string(),
        ErrorKind::NativeLoadFailed => "native load failed".to_string(),
    }
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(resource) = err.resource() {
        inner.insert("resource".to_string(), json!(resource));
    }
    if let Some(axis) = err.axis() {
        inner.insert("axis".to_string(), json!(format!("{axis:?}")));
    }
    let mut causes = Vec::new();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}
