//! tbw-daemon — entry point for running delegate payout workers.

use std::path::{Path, PathBuf};

use clap::Parser;
use tbw_ledger::{HttpExchange, HttpLedger};
use tbw_node::{init_logging, DelegateRegistry, DelegateWorker, LogFormat};
use tbw_store::VoterStore;
use tbw_store_memory::MemoryStore;
use tbw_types::{Address, DelegateConfig};

#[derive(Parser)]
#[command(name = "tbw-daemon", about = "True block weight payout daemon")]
struct Cli {
    /// Path to the delegate registry TOML file.
    #[arg(long, default_value = "tbw.toml", env = "TBW_CONFIG")]
    config: String,

    /// Directory for per-delegate store snapshots.
    #[arg(long, default_value = "./tbw_data", env = "TBW_DATA_DIR")]
    data_dir: PathBuf,

    /// Log level override: "trace", "debug", "info", "warn", "error".
    /// Defaults to the registry's log_level; RUST_LOG beats both.
    #[arg(long, env = "TBW_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run payout workers until interrupted.
    Run {
        /// Operate only the named delegates (repeatable).
        #[arg(long = "delegate", env = "TBW_DELEGATE")]
        delegates: Vec<String>,

        /// Operate every delegate in the registry.
        #[arg(long, conflicts_with = "delegates")]
        all: bool,
    },

    /// Adjust voter share rates.
    #[command(subcommand)]
    ShareRate(ShareRateAction),
}

#[derive(clap::Subcommand)]
enum ShareRateAction {
    /// Give one voter a custom share rate.
    Set {
        /// Delegate whose voter store to operate on.
        #[arg(long)]
        delegate: String,

        /// Voter address.
        #[arg(long)]
        voter: String,

        /// Share rate as a percent of a block reward.
        #[arg(long)]
        rate: u8,
    },

    /// Move every voter at one share rate to another.
    Migrate {
        #[arg(long)]
        delegate: String,

        /// Share rate to match.
        #[arg(long)]
        old_rate: u8,

        /// Replacement share rate.
        #[arg(long)]
        new_rate: u8,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let registry = DelegateRegistry::from_toml_file(&cli.config)?;
    let format = LogFormat::from_config(&registry.log_format);
    let level = cli.log_level.as_deref().unwrap_or(&registry.log_level);
    init_logging(format, level);
    tracing::info!(config = %cli.config, delegates = registry.delegates.len(), "registry loaded");

    std::fs::create_dir_all(&cli.data_dir)?;
    match cli.command {
        Command::Run { delegates, all } => {
            run_workers(&registry, &cli.data_dir, &delegates, all).await
        }
        Command::ShareRate(action) => share_rate(&registry, &cli.data_dir, action),
    }
}

/// Open the snapshot-backed store for a delegate. Workers and the
/// share-rate subcommands go through the same snapshot, so rate changes
/// apply to the voters the workers actually track.
fn open_store(config: &DelegateConfig, data_dir: &Path) -> anyhow::Result<MemoryStore> {
    Ok(MemoryStore::open(
        data_dir.join(format!("{}.json", config.name)),
    )?)
}

/// Spawn one worker task per selected delegate and supervise them.
/// Naming no delegate is the same as `--all`.
async fn run_workers(
    registry: &DelegateRegistry,
    data_dir: &Path,
    names: &[String],
    all: bool,
) -> anyhow::Result<()> {
    let selected: Vec<_> = if all || names.is_empty() {
        registry.delegates.iter().collect()
    } else {
        names
            .iter()
            .map(|n| registry.delegate(n))
            .collect::<Result<_, _>>()?
    };
    if selected.is_empty() {
        anyhow::bail!("no delegates configured");
    }

    let mut tasks = Vec::with_capacity(selected.len());
    for config in selected {
        let store = open_store(config, data_dir)?;
        let ledger = HttpLedger::new(config.relay_url.clone(), config.name.clone());
        let exchange = HttpExchange::new(config.atomic);
        let worker = DelegateWorker::new(config.clone(), store, ledger, exchange)?;
        tracing::info!(
            delegate = %config.name,
            relay = %config.relay_url,
            interval = config.interval,
            "starting payout worker"
        );
        tasks.push(tokio::spawn(worker.run()));
    }

    // Workers run forever; a JoinError here means one panicked.
    for task in tasks {
        task.await?;
    }
    Ok(())
}

fn share_rate(
    registry: &DelegateRegistry,
    data_dir: &Path,
    action: ShareRateAction,
) -> anyhow::Result<()> {
    match action {
        ShareRateAction::Set {
            delegate,
            voter,
            rate,
        } => {
            let store = open_store(registry.delegate(&delegate)?, data_dir)?;
            let address = Address::new(voter);
            store.set_share_rate(&address, rate)?;
            println!(
                "{}",
                serde_json::json!({
                    "delegate": delegate,
                    "voter": address.as_str(),
                    "share_rate": rate,
                })
            );
        }
        ShareRateAction::Migrate {
            delegate,
            old_rate,
            new_rate,
        } => {
            let store = open_store(registry.delegate(&delegate)?, data_dir)?;
            let updated = store.migrate_share_rate(old_rate, new_rate)?;
            println!(
                "{}",
                serde_json::json!({
                    "delegate": delegate,
                    "old_rate": old_rate,
                    "new_rate": new_rate,
                    "voters_updated": updated,
                })
            );
        }
    }
    Ok(())
}
