//! Concord CLI - operator tool for the deliberation registry
//!
//! Each invocation opens the registry (replaying the ledger), runs one
//! command, prints the result as JSON and exits.

use anyhow::Context;
use clap::Parser;
use concord_ledger::HashChainLedger;
use concord_registry::DeliberationRegistry;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod output;

use commands::Commands;
use config::ConcordConfig;

/// Concord CLI
#[derive(Debug, Parser)]
#[command(name = "concord")]
#[command(about = "Concord - hash-chained deliberation registry", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "CONCORD_CONFIG")]
    config: Option<String>,

    /// Ledger file, overriding the configured path
    #[arg(long, env = "CONCORD_LEDGER_PATH")]
    ledger: Option<String>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, env = "CONCORD_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration, then apply CLI overrides
    let mut config = ConcordConfig::load(cli.config.as_deref())
        .with_context(|| format!("failed to load configuration {:?}", cli.config))?;
    if let Some(ledger) = &cli.ledger {
        config.registry.ledger.path = ledger.into();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.logging.json |= cli.json_logs;

    init_tracing(&config);
    debug!(?config, "configuration loaded");

    // Verify reads the stored chain as-is, so a tampered ledger is reported.
    if matches!(cli.command, Commands::Verify) {
        if let Some(report) = HashChainLedger::inspect(&config.registry.ledger)
            .await
            .context("failed to read ledger")?
        {
            return commands::report_verification(&report);
        }
    }

    let registry = DeliberationRegistry::from_config(config.registry)
        .await
        .context("failed to open registry")?;

    let mutation = cli.command.is_mutation();
    cli.command.execute(&registry).await?;

    if mutation && !registry.is_durable().await {
        warn!("ledger write failed; retrying once before exit");
        registry
            .persist_ledger()
            .await
            .context("change applied but the ledger could not be written")?;
    }
    Ok(())
}

fn init_tracing(config: &ConcordConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    // Logs go to stderr so stdout carries only command output.
    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
