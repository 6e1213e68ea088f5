//! storectl - Inspect and edit Cosmos key/value stores
//!
//! Opens a store through the same configuration the applications use
//! (~/.config/cosmos/store.json plus environment overrides) and runs one
//! operation against it.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{error, info};
use store::{StoreConfig, backend_versions, get_backend_ops};

#[derive(Debug, Parser)]
#[command(name = "storectl", version, about = "Inspect and edit Cosmos key/value stores")]
struct Cli {
    /// Backend to use (defaults to the configured or first compiled-in backend)
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Store location (defaults to the configured path or the cache directory)
    #[arg(long, global = true)]
    path: Option<PathBuf>,

    /// Fail instead of creating a store that doesn't exist
    #[arg(long, global = true)]
    no_create: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List compiled-in backends with their engine versions
    Backends,
    /// Print the version of the selected backend
    Version,
    /// Save the selected backend and path to store.json
    Init,
    /// Print the value stored under a key
    Get {
        key: String,
        /// Print the value as hex instead of raw bytes
        #[arg(long)]
        hex: bool,
    },
    /// Store a value under a key, replacing any existing one
    Put { key: String, value: String },
    /// Remove a key
    Delete { key: String },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = StoreConfig::load()?;
    if cli.backend.is_some() {
        config.backend = cli.backend;
    }
    if cli.path.is_some() {
        config.path = cli.path;
    }
    if cli.no_create {
        config.create = false;
    }

    match cli.command {
        Command::Backends => {
            let default = get_backend_ops(None).map(|b| b.name());
            for (name, version) in backend_versions() {
                let marker = if Some(name) == default { " (default)" } else { "" };
                println!("{name}{marker}\t{version}");
            }
        }
        Command::Version => {
            println!("{}", config.backend()?.version());
        }
        Command::Init => {
            config.validate()?;
            config.save()?;
            let saved = ::config::config_path("store.json").unwrap_or_default();
            info!("Saved store config to {}", saved.display());
        }
        Command::Get { key, hex } => {
            let mut store = config.open()?;
            let Some(value) = store.fetch(key.as_bytes()) else {
                if let Some(e) = store.last_error() {
                    bail!("Failed to fetch '{}': {}", key, e);
                }
                bail!("Key not found: {}", key);
            };
            if hex {
                println!("{}", to_hex(&value));
            } else {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&value)?;
                stdout.write_all(b"\n")?;
            }
            store.free(Some(value));
        }
        Command::Put { key, value } => {
            let mut store = config.open()?;
            store
                .store(key.as_bytes(), value.as_bytes())
                .with_context(|| format!("Failed to store '{}'", key))?;
            info!("Stored {} bytes under '{}'", value.len(), key);
        }
        Command::Delete { key } => {
            let mut store = config.open()?;
            match store.delete_record(key.as_bytes()) {
                Ok(()) => info!("Deleted '{}'", key),
                Err(e) if e.is_not_found() => bail!("Key not found: {}", key),
                Err(e) => return Err(e).with_context(|| format!("Failed to delete '{}'", key)),
            }
        }
    }

    Ok(())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
