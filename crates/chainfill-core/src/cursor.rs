//! Reader cursor: tracks the reader's position in the delivered sequence.

use serde::{Deserialize, Serialize};

/// The reader's own position.
///
/// `current_block_number` is signed: in tail mode it starts below zero and is
/// rebased onto the first queued block when the reader initializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderCursor {
    /// Configured start (`<= 0` means tail mode).
    pub start_at_block: i64,
    /// Number of the block delivered last.
    pub current_block_number: i64,
    /// Next block the consumer needs; `None` until initialized or sought.
    pub next_block_needed: Option<u64>,
}

impl ReaderCursor {
    pub fn new(start_at_block: i64) -> Self {
        Self {
            start_at_block,
            current_block_number: start_at_block - 1,
            next_block_needed: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.next_block_needed.is_some()
    }

    /// One-time initialization against the first queued block number.
    ///
    /// Tail mode rebases onto `first_queued`; absolute mode starts at the
    /// configured block. A prior seek wins over both.
    pub fn initialize(&mut self, first_queued: u64) -> u64 {
        if let Some(needed) = self.next_block_needed {
            return needed;
        }
        let needed = if self.start_at_block <= 0 {
            self.current_block_number = first_queued as i64 - 1;
            first_queued
        } else {
            self.start_at_block as u64
        };
        self.next_block_needed = Some(needed);
        needed
    }

    /// Record `block_number` as the block delivered last.
    pub fn accept(&mut self, block_number: u64) {
        self.current_block_number = block_number as i64;
    }

    /// Move past the block just resolved.
    pub fn advance(&mut self) {
        if let Some(needed) = self.next_block_needed.as_mut() {
            *needed += 1;
        }
    }

    /// Reposition the next block needed.
    pub fn seek(&mut self, block_number: u64) {
        self.next_block_needed = Some(block_number);
    }
}

/// Read-only status snapshot of a block reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderInfo {
    pub current_block_number: i64,
    pub start_at_block: i64,
    /// Zero until the first transaction event has been observed.
    pub head_block_number: u64,
    pub only_irreversible: bool,
    /// Zero until the watermark is known.
    pub last_irreversible_block_number: u64,
}
