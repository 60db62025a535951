//! Block reader configuration.

use serde::{Deserialize, Serialize};

use crate::error::FillError;

/// Query used when none is configured: every executed transaction.
pub const DEFAULT_QUERY: &str = "status:executed";

/// Configuration for a block reader and the feed subscription behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// `>= 1`: absolute block number to start at.
    /// `<= 0`: tail mode, an offset from the current chain head.
    pub start_at_block: i64,
    /// Only stream irreversible data.
    pub only_irreversible: bool,
    /// Feed filter query, passed through untouched.
    pub query: String,
    /// Re-check period while waiting for data (milliseconds).
    pub poll_interval_ms: u64,
    /// Number of delivered blocks retained for `get_block`.
    pub history_size: usize,
    /// Queue length above which a warning is logged. Nothing is ever dropped.
    pub queue_high_water: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            start_at_block: 1,
            only_irreversible: false,
            query: DEFAULT_QUERY.into(),
            poll_interval_ms: 125,
            history_size: 128,
            queue_high_water: 1_024,
        }
    }
}

impl ReaderConfig {
    /// Returns `true` when the start is relative to the chain head.
    pub fn is_tail_mode(&self) -> bool {
        self.start_at_block <= 0
    }

    /// Reject settings that would make the reader misbehave silently.
    pub fn validate(&self) -> Result<(), FillError> {
        if self.poll_interval_ms == 0 {
            return Err(FillError::Config("poll_interval_ms must be greater than 0".into()));
        }
        if self.history_size == 0 {
            return Err(FillError::Config("history_size must be greater than 0".into()));
        }
        if self.query.trim().is_empty() {
            return Err(FillError::Config("query must not be empty".into()));
        }
        Ok(())
    }
}
