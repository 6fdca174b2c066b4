//! PeerQueue CLI binary
//!
//! Entry point for the matching queue. Provides commands for generating
//! and validating configuration and for running a scripted demo of the
//! queue lifecycle.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{generate_default_config, load_config, save_config, validate_config, AppConfig};
use observability::{init_logging, init_metrics, LogFormat, QueueMetrics};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use common::{SystemClock, UuidGenerator};
use queue_engine::audit::create_audit_log;
use queue_engine::store::create_store;
use queue_manager::{EnqueueRequest, QueueManager};
use rust_decimal_macros::dec;
use settlement::{MockBalanceLedger, SettlementNotifier};

#[derive(Parser, Debug)]
#[command(name = "pqx", about = "Peer-to-peer withdrawal/deposit matching queue")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scripted queue lifecycle against the configured store
    Demo {
        /// Path to the configuration file; defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long, default_value = "config/peerqueue.yaml")]
        config: PathBuf,
    },
    /// Write a default configuration file
    Init {
        #[arg(short, long, default_value = "config/peerqueue.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Demo { config } => demo_command(config).await,
        Commands::Validate { config } => validate_command(config),
        Commands::Init { output } => init_command(output),
    }
}

fn load_or_default(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            let config = load_config(path)
                .with_context(|| format!("Failed to load config from {:?}", path))?;
            validate_config(&config)?;
            Ok(config)
        }
        None => Ok(generate_default_config()),
    }
}

async fn demo_command(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_or_default(config_path.as_deref())?;

    let format = LogFormat::parse(&config.logging.format).unwrap_or(LogFormat::Pretty);
    init_logging(&config.app.name, &config.logging.level, format)?;
    if let Some(metrics_config) = &config.metrics {
        init_metrics(metrics_config.port)?;
    }

    info!(app = %config.app.name, backend = %config.store.backend, "PeerQueue starting");

    let clock = Arc::new(SystemClock);
    let id_gen = Arc::new(UuidGenerator);
    let store = create_store(&config.store, clock.clone(), id_gen.clone()).await?;
    let audit = create_audit_log();
    let manager = QueueManager::new(store.clone(), clock, id_gen, audit.clone())
        .with_metrics(QueueMetrics::new());
    let ledger = MockBalanceLedger::new();
    let notifier = SettlementNotifier::new(store, ledger, audit);

    // Alice wants $200 out via Venmo; nobody is waiting yet.
    let w = manager
        .enqueue_withdrawal(EnqueueRequest::new("alice", dec!(200), "venmo", "@alice"))
        .await?;
    println!("Withdrawal {} enqueued, waiting for a counterpart", w.item.id);

    // Bob wants to put $250 in via Venmo; this covers Alice's withdrawal.
    let d = manager
        .enqueue_deposit(EnqueueRequest::new("bob", dec!(250), "venmo", "@bob"))
        .await?;

    let record = d
        .matched
        .context("deposit should have matched the waiting withdrawal")?;
    println!(
        "Matched withdrawal {} with deposit {} (score {}, amount {})",
        record.withdrawal_id, record.deposit_id, record.match_score, record.amount
    );

    let settled = notifier.settle(record.id).await?;
    println!(
        "Match {} settled at {}",
        settled.id,
        settled
            .completed_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default()
    );

    let stats = manager.stats().await?;
    println!(
        "Queue stats: {} items total, {} pending withdrawals, {} pending deposits, {} matches",
        stats.total_items, stats.pending_withdrawals, stats.pending_deposits, stats.matched_pairs
    );

    Ok(())
}

fn validate_command(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config)?;

    println!("[ok] Configuration is valid!");
    println!();
    println!("App: {}", config.app.name);
    println!("Store backend: {}", config.store.backend);
    println!("Log level: {}", config.logging.level);

    Ok(())
}

fn init_command(output_path: PathBuf) -> Result<()> {
    let config = generate_default_config();

    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    save_config(&config, &output_path)?;

    println!("[ok] Configuration file created!");
    println!();
    println!("Location: {:?}", output_path);
    println!();
    println!("Next steps:");
    println!(
        "  1. Run 'pqx validate --config {:?}' to check the configuration",
        output_path
    );
    println!(
        "  2. Run 'pqx demo --config {:?}' to exercise the queue",
        output_path
    );

    Ok(())
}
