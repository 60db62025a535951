//! Fluent builder API for reader configurations.
//!
//! # Example
//!
//! ```rust,no_run
//! use chainfill_stream::ReaderBuilder;
//!
//! let config = ReaderBuilder::new()
//!     .start_at_block(65_000_000)
//!     .query("receiver:eosio.token action:transfer")
//!     .only_irreversible(true)
//!     .build_config()
//!     .unwrap();
//! ```

use chainfill_core::config::ReaderConfig;
use chainfill_core::error::FillError;

/// Fluent builder for `ReaderConfig`.
#[derive(Default)]
pub struct ReaderBuilder {
    config: ReaderConfig,
    absolute_start: Option<i64>,
    tail_offset: Option<u64>,
}

impl ReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start at an absolute block number (`>= 1`).
    pub fn start_at_block(mut self, block: i64) -> Self {
        self.absolute_start = Some(block);
        self
    }

    /// Start `offset` blocks behind the current chain head.
    pub fn tail(mut self, offset: u64) -> Self {
        self.tail_offset = Some(offset);
        self
    }

    /// Only stream irreversible data.
    pub fn only_irreversible(mut self, only: bool) -> Self {
        self.config.only_irreversible = only;
        self
    }

    /// Set the feed query.
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.config.query = query.into();
        self
    }

    /// Set the wait re-check period in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Set how many delivered blocks stay available to `get_block`.
    pub fn history_size(mut self, size: usize) -> Self {
        self.config.history_size = size;
        self
    }

    /// Set the queue length that triggers a backlog warning.
    pub fn queue_high_water(mut self, len: usize) -> Self {
        self.config.queue_high_water = len;
        self
    }

    /// Build and validate the `ReaderConfig`.
    pub fn build_config(self) -> Result<ReaderConfig, FillError> {
        let mut config = self.config;
        config.start_at_block = match (self.absolute_start, self.tail_offset) {
            (Some(_), Some(_)) => {
                return Err(FillError::Config(
                    "start_at_block and tail are mutually exclusive".into(),
                ))
            }
            (Some(block), None) if block < 1 => {
                return Err(FillError::Config(format!(
                    "start_at_block must be >= 1 (got {block}); use tail() for head-relative starts"
                )))
            }
            (Some(block), None) => block,
            (None, Some(offset)) => {
                let offset = i64::try_from(offset)
                    .map_err(|_| FillError::Config(format!("tail offset {offset} out of range")))?;
                -offset
            }
            (None, None) => config.start_at_block,
        };
        config.validate()?;
        Ok(config)
    }
}
