#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ledgerlite::cli::{self, Command, OutputMode};
use ledgerlite::mmr::MmrStore;
use serde::{Deserialize, Serialize};

/// Layered configuration (spec SPEC_FULL §4.10): CLI flag > environment variable >
/// config file > built-in default.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct AppConfig {
    env_dir: Option<PathBuf>,
    lock_safe: Option<bool>,
    log_dir: Option<PathBuf>,
    log_level: Option<String>,
}

fn find_config_paths(cli_cfg: Option<&PathBuf>) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(p) = cli_cfg {
        paths.push(p.clone());
    }
    if let Ok(p) = std::env::var("LEDGERLITE_CONFIG") {
        paths.push(PathBuf::from(p));
    }
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        let home = PathBuf::from(home);
        paths.push(home.join(".config").join("ledgerlite.toml"));
        paths.push(home.join(".ledgerliterc"));
    }
    if let Ok(cur) = std::env::current_dir() {
        paths.push(cur.join("ledgerlite.toml"));
    }
    paths
}

fn load_config(cli_cfg: Option<&PathBuf>) -> AppConfig {
    let mut cfg = AppConfig::default();
    for path in find_config_paths(cli_cfg) {
        if let Ok(text) = std::fs::read_to_string(&path)
            && let Ok(parsed) = toml::from_str::<AppConfig>(&text)
        {
            cfg = parsed;
            break;
        }
    }
    if let Ok(v) = std::env::var("LEDGERLITE_ENV_DIR") {
        cfg.env_dir = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("LEDGERLITE_LOCK_SAFE") {
        cfg.lock_safe = Some(matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
    }
    if let Ok(v) = std::env::var("LEDGERLITE_LOG_DIR") {
        cfg.log_dir = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("LEDGERLITE_LOG_LEVEL") {
        cfg.log_level = Some(v);
    }
    cfg
}

#[derive(Parser)]
#[command(name = "ledgerlite", about = "A multi-tenant authenticated data registry (store + MMR core).")]
struct Cli {
    /// Directory holding every service's sub-environment (default: ./ledgerlite-data).
    #[arg(long, global = true)]
    env_dir: Option<PathBuf>,

    /// Path to a TOML config file, checked ahead of the usual search locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output rendering.
    #[arg(long, global = true, value_enum, default_value = "human")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Plain,
    Json,
}

impl From<OutputFormat> for OutputMode {
    fn from(f: OutputFormat) -> Self {
        match f {
            OutputFormat::Human => Self::Human,
            OutputFormat::Plain => Self::Plain,
            OutputFormat::Json => Self::Json,
        }
    }
}

#[derive(Subcommand)]
enum Cmd {
    /// Create, list, append to, prove against, and delete services.
    Service {
        #[command(subcommand)]
        action: ServiceCmd,
    },
    /// Inspect a container's sidecar metadata.
    Container {
        #[command(subcommand)]
        action: ContainerCmd,
    },
    /// List or toggle runtime feature flags.
    Feature {
        #[command(subcommand)]
        action: FeatureCmd,
    },
}

#[derive(Subcommand)]
enum ServiceCmd {
    Create { name: String },
    List,
    Delete { name: String },
    Append { name: String, blob_hex: String },
    Root { name: String },
    Prove { name: String, blob_hex: String },
    Verify { bundle_path: PathBuf },
}

#[derive(Subcommand)]
enum ContainerCmd {
    Stat { env_path: PathBuf, name: String },
}

#[derive(Subcommand)]
enum FeatureCmd {
    List,
    Enable { name: String },
    Disable { name: String },
}

fn to_command(cmd: Cmd) -> Command {
    match cmd {
        Cmd::Service { action } => match action {
            ServiceCmd::Create { name } => Command::ServiceCreate { name },
            ServiceCmd::List => Command::ServiceList,
            ServiceCmd::Delete { name } => Command::ServiceDelete { name },
            ServiceCmd::Append { name, blob_hex } => Command::ServiceAppend { name, blob_hex },
            ServiceCmd::Root { name } => Command::ServiceRoot { name },
            ServiceCmd::Prove { name, blob_hex } => Command::ServiceProve { name, blob_hex },
            ServiceCmd::Verify { bundle_path } => Command::ServiceVerify { bundle_path },
        },
        Cmd::Container { action } => match action {
            ContainerCmd::Stat { env_path, name } => Command::ContainerStat { env_path, name },
        },
        Cmd::Feature { action } => match action {
            FeatureCmd::List => Command::FeatureList,
            FeatureCmd::Enable { name } => Command::FeatureEnable { name },
            FeatureCmd::Disable { name } => Command::FeatureDisable { name },
        },
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_ref());

    ledgerlite::utils::feature_flags::init_from_env();
    ledgerlite::utils::logger::configure_logging(
        cfg.log_dir.as_deref(),
        cfg.log_level.as_deref(),
        None,
    );

    let env_dir = cli.env_dir.or(cfg.env_dir).unwrap_or_else(|| ledgerlite::utils::fsutil::normalize_env_path(None));
    let lock_safe = cfg.lock_safe.unwrap_or(true);
    let _ = lock_safe; // MmrStore currently always opens its environments lock-safe; kept for config parity.

    let store = match MmrStore::open(env_dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let mode: OutputMode = cli.format.into();
    match cli::run_with_format(&store, to_command(cli.command), mode) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}
