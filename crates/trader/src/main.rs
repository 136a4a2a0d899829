//! Trader
//!
//! Reads market snapshots with strategy decisions as newline-delimited JSON,
//! runs each through the trading session on a per-market worker, and prints
//! every outcome as a JSON line.

use anyhow::{Context, Result};
use clap::Parser;
use polymarket_core::config::{Config, ExecutionMode};
use risk_manager::RiskManager;
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use trader::{build_engine, parse_line, FeedMessage, TradingSession};
use trading_engine::PositionLedger;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Queued messages per market before the reader waits.
const WORKER_QUEUE: usize = 64;

#[derive(Parser)]
#[command(name = "trader")]
#[command(version, about = "Execution and risk core for 15-minute up/down markets", long_about = None)]
struct Cli {
    /// TOML config file; environment variables are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Decision feed (NDJSON); stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Override the configured execution mode (paper, mock, live)
    #[arg(long, value_parser = parse_mode)]
    mode: Option<ExecutionMode>,
}

fn parse_mode(s: &str) -> std::result::Result<ExecutionMode, String> {
    s.parse().map_err(|e: polymarket_core::Error| e.to_string())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "trader=info,trading_engine=info,risk_manager=info".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    // Logs go to stderr; stdout carries outcomes.
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn emit(value: serde_json::Value) {
    println!("{}", value);
}

async fn run_worker(
    market_id: String,
    session: Arc<TradingSession>,
    mut rx: mpsc::Receiver<FeedMessage>,
    stopping: Arc<AtomicBool>,
) {
    while let Some(message) = rx.recv().await {
        if stopping.load(Ordering::SeqCst) {
            warn!(market = %market_id, "Dropping queued message during shutdown");
            continue;
        }
        match message {
            FeedMessage::Decision { snapshot, decision } => {
                match session.handle(&snapshot, &decision).await {
                    Ok(outcome) => emit(json!({ "market_id": market_id, "result": outcome })),
                    Err(e) => {
                        error!(market = %market_id, error = %e, "Decision failed");
                        emit(json!({ "market_id": market_id, "error": e.to_string() }));
                    }
                }
            }
            FeedMessage::Settle { settle } => {
                match session.settle_market(&settle.market_id, settle.price).await {
                    Ok(trade) => emit(json!({ "market_id": market_id, "settled": trade })),
                    Err(e) => {
                        warn!(market = %market_id, error = %e, "Settlement skipped");
                        emit(json!({ "market_id": market_id, "error": e.to_string() }));
                    }
                }
            }
        }
    }
}

async fn dispatch<R>(reader: R, session: Arc<TradingSession>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let stopping = Arc::new(AtomicBool::new(false));
    let mut senders: HashMap<String, mpsc::Sender<FeedMessage>> = HashMap::new();
    let mut workers = JoinSet::new();
    let mut lines = reader.lines();
    let mut interrupted = false;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read input")?,
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C. Shutting down...");
                interrupted = true;
                break;
            }
        };
        let Some(line) = line else {
            info!("Input exhausted");
            break;
        };

        let message = match parse_line(&line) {
            None => continue,
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                warn!(error = %e, "Skipping malformed input line");
                emit(json!({ "error": format!("malformed input: {}", e) }));
                continue;
            }
        };

        let market_id = message.market_id().to_string();
        let sender = senders.entry(market_id.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(WORKER_QUEUE);
            workers.spawn(run_worker(
                market_id.clone(),
                session.clone(),
                rx,
                stopping.clone(),
            ));
            tx
        });
        if sender.send(message).await.is_err() {
            error!(market = %market_id, "Market worker stopped unexpectedly");
        }
    }

    drop(senders);
    if interrupted {
        stopping.store(true, Ordering::SeqCst);
        session.shutdown().await;
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Market worker panicked");
        }
    }
    if !interrupted {
        session.shutdown().await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::from_env()?,
    };
    let mode = cli.mode.unwrap_or(config.execution.mode);
    info!(mode = %mode, "Starting trader");

    let ledger = Arc::new(PositionLedger::new());
    let risk = Arc::new(RiskManager::new(ledger.clone(), &config.risk));
    let engine = build_engine(&config, mode)?;
    let session = Arc::new(TradingSession::new(ledger, risk, engine, &config.execution));

    match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            dispatch(BufReader::new(file), session.clone()).await?;
        }
        None => dispatch(BufReader::new(tokio::io::stdin()), session.clone()).await?,
    }

    let status = session.status().await;
    info!(
        session_pnl = %status.risk.session_pnl,
        total_trades = status.risk.total_trades,
        open_positions = status.open_positions.len(),
        "Trader stopped"
    );
    emit(json!({ "final_status": status, "trades": session.trade_history() }));
    Ok(())
}
