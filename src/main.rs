use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mtfsig::prelude::*;

#[derive(Parser)]
#[command(name = "mtfsig", about = "Multi-timeframe market-structure signal engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate every symbol each cycle until interrupted, logging alerts
    Run {
        /// TOML engine config
        #[arg(short, long)]
        config: PathBuf,
        /// Directory of `<SYMBOL>_<tf>.json` candle dumps
        #[arg(short, long)]
        data: PathBuf,
    },
    /// Single parallel pass over the stored candles, printing the signals
    Scan {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        /// Print signals as JSON lines instead of alert text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> mtfsig::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Run { config, data } => run(config, data).await,
        Command::Scan { config, data, json } => scan(config, data, json).await,
    }
}

async fn run(config: PathBuf, data: PathBuf) -> mtfsig::Result<()> {
    let config = EngineConfig::from_toml(&config)?;
    let mut engine = SignalEngine::new(config, JsonFileSource::new(data), LogSink)?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current symbol");
            trigger.cancel();
        }
    });

    engine.run(&shutdown).await;
    Ok(())
}

async fn scan(config: PathBuf, data: PathBuf, json: bool) -> mtfsig::Result<()> {
    let config = EngineConfig::from_toml(&config)?;
    let mut engine = SignalEngine::new(config, JsonFileSource::new(data), LogSink)?;

    for (symbol, reason) in engine.refresh_all().await {
        warn!(%symbol, %reason, "skipping symbol");
    }

    let report = engine.scan_parallel();
    for signal in report.signals() {
        if json {
            match serde_json::to_string(signal) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(symbol = %signal.symbol, error = %e, "cannot encode signal"),
            }
        } else {
            println!("{signal}\n");
        }
    }
    info!(
        emitted = report.emitted_count(),
        suppressed = report.suppressed_count(),
        "scan complete"
    );
    Ok(())
}
