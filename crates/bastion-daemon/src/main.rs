// crates/bastion-daemon/src/main.rs
//
// Binary entrypoint for the Bastion staking daemon.
//
// Initializes tracing, parses CLI arguments, loads configuration, opens the
// state store, applies genesis on first start and hands over to the block
// scheduler.

mod config;
mod genesis;
mod scheduler;

use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use config::DaemonConfig;
use scheduler::BlockScheduler;

use bastion_core::{HexCodec, KvStore};
use bastion_staking::{Keeper, StoreBank};
use bastion_store::{MemStore, RocksStore};

/// Bastion staking daemon: drives the staking engine block by block.
#[derive(Parser, Debug)]
#[command(name = "bastion-daemon", version = "0.1.0", about = "Bastion staking engine daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.bastion/config.toml")]
    config: String,

    /// Override the data directory from the config file.
    #[arg(long)]
    data_dir: Option<String>,

    /// Override the genesis file from the config file.
    #[arg(long)]
    genesis: Option<String>,

    /// Keep all state in memory.
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration from TOML file, falling back to defaults if the file
    // is not found.
    let loaded = DaemonConfig::load(&args.config);
    let mut daemon_config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => DaemonConfig::default(),
    };

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&daemon_config.log_level)),
        )
        .init();

    match loaded {
        Ok(_) => tracing::info!("Loaded configuration from {}", args.config),
        Err(e) => tracing::warn!(
            "Could not load config from {}: {}. Using defaults.",
            args.config,
            e
        ),
    }

    // CLI flags override the config file values.
    if let Some(data_dir) = args.data_dir {
        daemon_config.data_dir = data_dir;
    }
    if let Some(genesis) = args.genesis {
        daemon_config.genesis_path = Some(genesis);
    }
    daemon_config.memory_store |= args.memory;

    tracing::info!("Bastion Staking Daemon v0.1.0");
    tracing::info!("Chain ID: {}", daemon_config.chain_id);
    tracing::info!("Block interval: {}s", daemon_config.block_interval_secs);

    let store = open_store(&daemon_config)?;
    let keeper = Keeper::new(Box::new(StoreBank::new()), Box::new(HexCodec::default()));
    let mut scheduler = BlockScheduler::new(
        keeper,
        store,
        daemon_config.chain_id.clone(),
        Duration::from_secs(daemon_config.block_interval_secs.max(1)),
    )?;

    if scheduler.is_initialized() {
        tracing::info!("Resuming from height {:?}", scheduler.height());
    } else {
        let genesis_state = match &daemon_config.genesis_path {
            Some(path) => {
                let state = genesis::load(path)?;
                tracing::info!("Loaded genesis from {}", path);
                state
            }
            None => {
                tracing::warn!(
                    "No genesis file configured; generating a dev genesis with {} validators",
                    daemon_config.dev_validators
                );
                genesis::dev_genesis(&HexCodec::default(), daemon_config.dev_validators)
            }
        };
        scheduler.init_chain(&genesis_state, Utc::now())?;
    }

    scheduler.run().await?;

    tracing::info!("Bastion daemon shut down");
    Ok(())
}

/// Open the configured state store: RocksDB under the data directory, or an
/// in-memory store when `memory_store` is set.
fn open_store(config: &DaemonConfig) -> Result<Box<dyn KvStore>, Box<dyn std::error::Error>> {
    if config.memory_store {
        tracing::warn!("Using in-memory state store; state is lost on shutdown");
        return Ok(Box::new(MemStore::new()));
    }
    let path = config.state_db_path();
    std::fs::create_dir_all(config::expand_tilde(&config.data_dir))?;
    let store = RocksStore::open(&path)?;
    tracing::info!("State store opened at {}", path);
    Ok(Box::new(store))
}
