//! chainfill CLI: replay captured transaction feeds through the block engine.
//!
//! # Commands
//! ```
//! chainfill replay capture.jsonl
//! chainfill replay capture.jsonl --start 65000000
//! chainfill replay capture.jsonl --tail 300 --log-level debug --json-logs
//! chainfill info
//! chainfill version
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chainfill_core::{BlockAssembler, BlockReader, ReaderConfig};
use chainfill_stream::{FeedDriver, ReaderBuilder, ReplayFeed};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "chainfill",
    about = "Gap-free block reconstruction from filtered transaction feeds",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines feed capture and print delivered blocks
    Replay {
        /// Capture file, one feed message per line
        file: PathBuf,
        /// Absolute start block (default: the capture's first block)
        #[arg(long, conflicts_with = "tail")]
        start: Option<i64>,
        /// Start N blocks behind the head instead
        #[arg(long)]
        tail: Option<u64>,
        /// trace | debug | info | warn | error (default: RUST_LOG or warn)
        #[arg(long)]
        log_level: Option<String>,
        /// Emit structured JSON logs
        #[arg(long)]
        json_logs: bool,
    },

    /// Show ChainFill defaults
    Info,

    /// Print version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { file, start, tail, log_level, json_logs } => {
            init_tracing(log_level.as_deref(), json_logs);
            cmd_replay(&file, replay_config(start, tail)?).await
        }

        Commands::Info => {
            cmd_info();
            Ok(())
        }

        Commands::Version => {
            println!("chainfill {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn cmd_info() {
    let defaults = ReaderConfig::default();
    println!("ChainFill v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default start block: {}", defaults.start_at_block);
    println!("  Default query: {}", defaults.query);
    println!("  Default poll interval: {}ms", defaults.poll_interval_ms);
    println!("  Delivered-block history: {} blocks", defaults.history_size);
    println!("  Queue warning threshold: {} blocks", defaults.queue_high_water);
}

/// Without `--start` a replay follows the capture from its first block.
fn replay_config(start: Option<i64>, tail: Option<u64>) -> Result<ReaderConfig> {
    let mut builder = ReaderBuilder::new();
    if let Some(start) = start {
        builder = builder.start_at_block(start);
    }
    if let Some(offset) = tail.or(start.is_none().then_some(0)) {
        builder = builder.tail(offset);
    }
    Ok(builder.build_config()?)
}

async fn cmd_replay(path: &Path, config: ReaderConfig) -> Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let feed = ReplayFeed::from_jsonl(&text);
    tracing::info!(path = %path.display(), messages = feed.len(), "Replaying capture");

    let assembler = Arc::new(BlockAssembler::new(config.start_at_block));
    let mut reader = BlockReader::new(config.clone(), assembler.clone())?;
    let idle = Duration::from_millis(config.poll_interval_ms * 4);

    let driver = Arc::new(FeedDriver::new(feed, assembler, config));
    let pump = tokio::spawn({
        let driver = driver.clone();
        async move { driver.run_until_complete().await }
    });

    loop {
        match tokio::time::timeout(idle, reader.get_next_block()).await {
            Ok(next) => println!("{}", serde_json::to_string(&next)?),
            Err(_) if pump.is_finished() && reader.queued_len() == 0 => break,
            Err(_) => continue,
        }
    }
    pump.await.context("replay task panicked")??;

    let metrics = driver.metrics();
    let info = reader.info();
    tracing::info!(
        messages = metrics.messages,
        decode_errors = metrics.decode_errors,
        current_block = info.current_block_number,
        head_block = info.head_block_number,
        last_irreversible = info.last_irreversible_block_number,
        "Replay complete"
    );
    Ok(())
}

/// Install the global subscriber: explicit level, else `RUST_LOG`, else `warn`.
fn init_tracing(level: Option<&str>, json: bool) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let layer = fmt::layer().with_writer(std::io::stderr);
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}
