//! `TransactionFeed` trait + the driver pumping a feed into an assembler.
//!
//! The feed owns its connection, authentication and transport; the driver
//! only consumes the message stream it returns. When a stream fails or ends,
//! the driver resubscribes from the assembler's active cursor so no
//! transaction is processed twice.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};

use chainfill_core::assembler::BlockAssembler;
use chainfill_core::config::ReaderConfig;
use chainfill_core::error::FillError;
use chainfill_core::types::FeedMessage;

use crate::wire;

/// A stream of feed messages from a single subscription.
pub type FeedStream = Pin<Box<dyn Stream<Item = Result<FeedMessage, FillError>> + Send>>;

/// Subscription parameters handed to the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRequest {
    /// Resume position; empty for a fresh subscription.
    pub cursor: String,
    /// First block of interest (`<= 0` is relative to the chain head).
    pub low_block_num: i64,
    pub query: String,
    pub only_irreversible: bool,
}

impl FeedRequest {
    pub fn new(config: &ReaderConfig, cursor: impl Into<String>) -> Self {
        Self {
            cursor: cursor.into(),
            low_block_num: config.start_at_block,
            query: config.query.clone(),
            only_irreversible: config.only_irreversible,
        }
    }
}

/// Source of transaction events, in non-decreasing block order.
#[async_trait]
pub trait TransactionFeed: Send + Sync {
    /// Open a subscription and return its message stream.
    async fn subscribe(&self, request: &FeedRequest) -> Result<FeedStream, FillError>;
}

/// Counters for the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverMetrics {
    pub messages: u64,
    pub decode_errors: u64,
    pub resubscriptions: u64,
}

enum PumpEnd {
    Completed,
    Failed(FillError),
}

/// Pumps a [`TransactionFeed`] into a [`BlockAssembler`].
pub struct FeedDriver<F> {
    feed: F,
    assembler: Arc<BlockAssembler>,
    config: ReaderConfig,
    metrics: Mutex<DriverMetrics>,
}

impl<F: TransactionFeed> FeedDriver<F> {
    pub fn new(feed: F, assembler: Arc<BlockAssembler>, config: ReaderConfig) -> Self {
        Self {
            feed,
            assembler,
            config,
            metrics: Mutex::new(DriverMetrics::default()),
        }
    }

    /// Returns a snapshot of current metrics.
    pub fn metrics(&self) -> DriverMetrics {
        self.metrics.lock().unwrap().clone()
    }

    /// The subscription request for the current position.
    pub fn request(&self) -> FeedRequest {
        FeedRequest::new(&self.config, self.assembler.active_cursor())
    }

    /// Pump forever, resubscribing whenever the subscription fails or ends.
    pub async fn run(&self) {
        let mut retry = 0u32;
        loop {
            let request = self.request();
            tracing::info!(
                cursor = %request.cursor,
                low_block_num = request.low_block_num,
                "Subscribing to transaction feed"
            );
            match self.feed.subscribe(&request).await {
                Err(e) => {
                    tracing::error!("Feed subscribe error: {e}");
                }
                Ok(stream) => {
                    let before = self.metrics().messages;
                    match self.pump(stream).await {
                        PumpEnd::Completed => tracing::info!("Feed stream closed, resubscribing..."),
                        PumpEnd::Failed(e) => tracing::warn!("Feed stream error: {e}"),
                    }
                    if self.metrics().messages > before {
                        retry = 0;
                    }
                }
            }
            self.metrics.lock().unwrap().resubscriptions += 1;
            tokio::time::sleep(backoff(retry)).await;
            retry += 1;
        }
    }

    /// Subscribe once and pump until the stream ends.
    ///
    /// A malformed message is skipped; any other stream error is returned.
    pub async fn run_until_complete(&self) -> Result<(), FillError> {
        let stream = self.feed.subscribe(&self.request()).await?;
        match self.pump(stream).await {
            PumpEnd::Completed => Ok(()),
            PumpEnd::Failed(e) => Err(e),
        }
    }

    async fn pump(&self, mut stream: FeedStream) -> PumpEnd {
        while let Some(item) = stream.next().await {
            match item {
                Ok(message) => {
                    self.assembler.on_transaction_received(message).await;
                    self.metrics.lock().unwrap().messages += 1;
                }
                Err(FillError::Decode(reason)) => {
                    tracing::warn!("Skipping malformed feed message: {reason}");
                    self.metrics.lock().unwrap().decode_errors += 1;
                }
                Err(e) => return PumpEnd::Failed(e),
            }
        }
        PumpEnd::Completed
    }
}

fn backoff(retry: u32) -> Duration {
    Duration::from_millis(500 * 2u64.pow(retry.min(6)))
}

// ─── Replay feed ──────────────────────────────────────────────────────────────

/// A feed serving a fixed, pre-recorded message sequence.
///
/// Resubscribing with a cursor resumes right after the transaction carrying
/// that cursor.
#[derive(Debug, Clone, Default)]
pub struct ReplayFeed {
    /// Decoded messages; `Err` holds the decode failure of a malformed entry.
    entries: Vec<Result<FeedMessage, String>>,
}

impl ReplayFeed {
    pub fn new(messages: Vec<FeedMessage>) -> Self {
        Self {
            entries: messages.into_iter().map(Ok).collect(),
        }
    }

    /// Build from JSON lines; blank lines are ignored, malformed ones kept
    /// as decode errors.
    pub fn from_jsonl(text: &str) -> Self {
        let entries = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| wire::decode_line(line).map_err(|e| e.to_string()))
            .collect();
        Self { entries }
    }

    /// Number of entries, malformed ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resume_index(&self, cursor: &str) -> usize {
        if cursor.is_empty() {
            return 0;
        }
        self.entries
            .iter()
            .position(|entry| {
                matches!(entry, Ok(FeedMessage::Transaction(event)) if event.cursor == cursor)
            })
            .map_or(0, |i| i + 1)
    }
}

#[async_trait]
impl TransactionFeed for ReplayFeed {
    async fn subscribe(&self, request: &FeedRequest) -> Result<FeedStream, FillError> {
        let items: Vec<Result<FeedMessage, FillError>> = self.entries[self.resume_index(&request.cursor)..]
            .iter()
            .cloned()
            .map(|entry| entry.map_err(FillError::Decode))
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}
