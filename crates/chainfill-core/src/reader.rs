//! Block reader: pull-based, demand-driven access to the assembler's output.
//!
//! The reader registers a listener on a [`BlockAssembler`] which pushes every
//! published record into a FIFO queue. The consumer then pulls one block at a
//! time with [`BlockReader::get_next_block`]:
//!
//! ```text
//! assembler ──push──▶ queue ──▶ get_next_block()
//!                       │         ├─ drop entries below the needed number
//!                       │         ├─ head == needed → serve it
//!                       │         └─ head >  needed → serve a synthetic block
//!                       └── head / irreversible watermarks (running maximum)
//! ```
//!
//! Every wait suspends the caller only; the assembler keeps publishing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::assembler::BlockAssembler;
use crate::config::ReaderConfig;
use crate::cursor::{ReaderCursor, ReaderInfo};
use crate::error::FillError;
use crate::listener::{BlockListener, ListenerId};
use crate::types::{Block, NextBlock};

#[derive(Debug, Default, Clone, Copy)]
struct Watermarks {
    head: Option<u64>,
    last_irreversible: Option<u64>,
}

impl Watermarks {
    fn observe(&mut self, block_number: u64, last_irreversible: u64) {
        self.head = Some(self.head.map_or(block_number, |h| h.max(block_number)));
        self.last_irreversible = Some(
            self.last_irreversible
                .map_or(last_irreversible, |l| l.max(last_irreversible)),
        );
    }
}

/// State shared between the assembler-side listener and the reader.
struct Shared {
    queue: Mutex<VecDeque<NextBlock>>,
    watermarks: Mutex<Watermarks>,
    changed: Notify,
    queue_high_water: usize,
    above_high_water: AtomicBool,
}

impl Shared {
    fn watermarks(&self) -> Watermarks {
        *self.watermarks.lock().unwrap()
    }

    fn front_number(&self) -> Option<u64> {
        self.queue.lock().unwrap().front().map(NextBlock::number)
    }
}

/// Listener feeding the reader's queue.
struct QueueListener(Arc<Shared>);

impl BlockListener for QueueListener {
    fn on_block(&self, block: &NextBlock) {
        let shared = &self.0;
        shared
            .watermarks
            .lock()
            .unwrap()
            .observe(block.number(), block.last_irreversible_block_number);

        let len = {
            let mut queue = shared.queue.lock().unwrap();
            queue.push_back(block.clone());
            queue.len()
        };
        tracing::trace!(block = block.number(), queued = len, "Adding block to the queue");

        if len > shared.queue_high_water && !shared.above_high_water.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                queued = len,
                high_water = shared.queue_high_water,
                "Block queue above high-water mark; consumer is falling behind"
            );
        }
        shared.changed.notify_waiters();
    }

    fn on_progress(&self, block_number: u64, last_irreversible_block_number: u64) {
        self.0
            .watermarks
            .lock()
            .unwrap()
            .observe(block_number, last_irreversible_block_number);
        self.0.changed.notify_waiters();
    }
}

/// Outcome of a queue lookup for `get_next_block`.
enum Resolution {
    Queued(NextBlock),
    Missing,
    Drained,
}

/// Outcome of a queue lookup for `get_block`.
enum Lookup {
    Found(Block),
    Missing { previous_hash: String },
    Behind { queue_head: u64 },
}

/// Serves the assembler's records one block number at a time.
pub struct BlockReader {
    config: ReaderConfig,
    assembler: Arc<BlockAssembler>,
    listener_id: ListenerId,
    shared: Arc<Shared>,
    cursor: ReaderCursor,
    current_block: Option<Block>,
    /// Recently delivered blocks, oldest first.
    history: VecDeque<Block>,
}

impl BlockReader {
    /// Create a reader and subscribe it to `assembler`.
    ///
    /// Fails fast on an invalid configuration.
    pub fn new(config: ReaderConfig, assembler: Arc<BlockAssembler>) -> Result<Self, FillError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            watermarks: Mutex::new(Watermarks::default()),
            changed: Notify::new(),
            queue_high_water: config.queue_high_water,
            above_high_water: AtomicBool::new(false),
        });
        let listener_id = assembler.add_on_block_listener(Arc::new(QueueListener(shared.clone())));

        tracing::debug!(
            start_at_block = config.start_at_block,
            only_irreversible = config.only_irreversible,
            query = %config.query,
            %listener_id,
            "BlockReader created"
        );

        Ok(Self {
            cursor: ReaderCursor::new(config.start_at_block),
            history: VecDeque::with_capacity(config.history_size),
            config,
            assembler,
            listener_id,
            shared,
            current_block: None,
        })
    }

    /// The assembler this reader consumes.
    pub fn assembler(&self) -> &Arc<BlockAssembler> {
        &self.assembler
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// The block delivered last, if any.
    pub fn current_block(&self) -> Option<&Block> {
        self.current_block.as_ref()
    }

    /// Number of records waiting in the queue.
    pub fn queued_len(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    /// Suspend until `check` yields a value.
    ///
    /// Woken by every queue push or watermark change, and re-checked every
    /// `poll_interval_ms` regardless.
    async fn wait_for<T>(&self, mut check: impl FnMut(&Shared) -> Option<T>) -> T {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = check(&self.shared) {
                return value;
            }
            let _ = tokio::time::timeout(interval, notified).await;
        }
    }

    /// Return the block the consumer needs next, waiting for data if the
    /// queue is empty.
    ///
    /// Successive calls yield consecutive block numbers. Numbers the feed
    /// never reported are served as synthetic, action-less blocks. A rollback
    /// record keeps the `previous_block_hash` the feed reported; every other
    /// record is relinked to the block delivered before it.
    pub async fn get_next_block(&mut self) -> NextBlock {
        loop {
            let first_queued = self.wait_for(Shared::front_number).await;
            let needed = self.cursor.initialize(first_queued);

            let resolution = {
                let mut queue = self.shared.queue.lock().unwrap();
                while queue.front().is_some_and(|front| front.number() < needed) {
                    if let Some(stale) = queue.pop_front() {
                        if stale.is_rollback() {
                            tracing::warn!(
                                block = stale.number(),
                                needed,
                                "Dropping rollback behind the cursor; seek to recover"
                            );
                        } else {
                            tracing::trace!(block = stale.number(), needed, "Dropping stale block");
                        }
                    }
                }
                match queue.front().map(NextBlock::number) {
                    None => Resolution::Drained,
                    Some(number) if number == needed => match queue.pop_front() {
                        Some(next) => Resolution::Queued(next),
                        None => Resolution::Drained,
                    },
                    Some(_) => Resolution::Missing,
                }
            };

            let next = match resolution {
                Resolution::Drained => continue,
                Resolution::Queued(mut next) => {
                    if !next.is_rollback() {
                        if let Some(current) = &self.current_block {
                            if !next.block.block_info.extends(&current.block_info) {
                                tracing::debug!(
                                    block = next.number(),
                                    previous = current.number(),
                                    "Relinking block onto the delivered chain"
                                );
                            }
                            next.block.block_info.previous_block_hash =
                                current.block_info.block_hash.clone();
                        }
                    }
                    next
                }
                Resolution::Missing => {
                    let previous_hash = self
                        .current_block
                        .as_ref()
                        .map(|b| b.block_info.block_hash.clone())
                        .unwrap_or_default();
                    let lib = self.shared.watermarks().last_irreversible.unwrap_or(0);
                    tracing::debug!(block = needed, "Serving synthetic block ahead of the queue");
                    NextBlock::synthetic(Block::synthetic(needed, "", previous_hash), lib)
                }
            };

            if self.queued_len() <= self.shared.queue_high_water {
                self.shared.above_high_water.store(false, Ordering::Relaxed);
            }

            self.accept(next.block.clone());
            self.cursor.advance();
            return next;
        }
    }

    /// Resolve block `block_number` without moving the cursor.
    ///
    /// Served from the delivery history or the queue; a number missing from
    /// the queue but bracketed by queued blocks resolves to a synthetic block.
    /// A number behind the queue head or already delivered, and no longer
    /// retained, fails with [`FillError::UnresolvableBlock`] without waiting.
    pub async fn get_block(&self, block_number: u64) -> Result<Block, FillError> {
        if let Some(block) = self.history.iter().rev().find(|b| b.number() == block_number) {
            return Ok(block.clone());
        }

        let delivered = self.cursor.current_block_number;
        let already_delivered = i64::try_from(block_number).map_or(false, |n| n <= delivered);

        let lookup = self
            .wait_for(|shared| {
                let queue = shared.queue.lock().unwrap();
                if let Some(found) = queue.iter().find(|b| b.number() == block_number) {
                    return Some(Lookup::Found(found.block.clone()));
                }
                let queue_head = match queue.front() {
                    Some(front) => front.number(),
                    None if already_delivered => {
                        return Some(Lookup::Behind {
                            queue_head: (delivered + 1) as u64,
                        })
                    }
                    None => return None,
                };
                if block_number < queue_head || already_delivered {
                    return Some(Lookup::Behind { queue_head });
                }
                if queue.back()?.number() > block_number {
                    let previous_hash = queue
                        .iter()
                        .rev()
                        .find(|b| b.number() + 1 == block_number)
                        .map(|b| b.block.hash().to_string())
                        .unwrap_or_default();
                    return Some(Lookup::Missing { previous_hash });
                }
                None
            })
            .await;

        match lookup {
            Lookup::Found(block) => Ok(block),
            Lookup::Missing { previous_hash } => Ok(Block::synthetic(block_number, "", previous_hash)),
            Lookup::Behind { queue_head } => {
                tracing::error!(requested = block_number, queue_head, "Cannot go back in time");
                Err(FillError::UnresolvableBlock {
                    requested: block_number,
                    queue_head,
                })
            }
        }
    }

    /// Make `block_number` the next block served by `get_next_block`.
    pub fn seek_to_block(&mut self, block_number: u64) {
        tracing::debug!(block = block_number, "Seeking");
        self.cursor.seek(block_number);
    }

    /// Highest block number observed so far; waits for the first observation.
    pub async fn get_head_block_number(&self) -> u64 {
        self.wait_for(|shared| shared.watermarks().head).await
    }

    /// Highest irreversible block number observed so far; waits until known.
    pub async fn get_last_irreversible_block_number(&self) -> u64 {
        self.wait_for(|shared| shared.watermarks().last_irreversible).await
    }

    /// Status snapshot.
    pub fn info(&self) -> ReaderInfo {
        let watermarks = self.shared.watermarks();
        ReaderInfo {
            current_block_number: self.cursor.current_block_number,
            start_at_block: self.config.start_at_block,
            head_block_number: watermarks.head.unwrap_or(0),
            only_irreversible: self.config.only_irreversible,
            last_irreversible_block_number: watermarks.last_irreversible.unwrap_or(0),
        }
    }

    fn accept(&mut self, block: Block) {
        self.cursor.accept(block.number());
        if self.history.len() >= self.config.history_size {
            self.history.pop_front();
        }
        self.history.push_back(block.clone());
        self.current_block = Some(block);
    }
}

impl Drop for BlockReader {
    fn drop(&mut self) {
        self.assembler.remove_on_block_listener(self.listener_id);
    }
}
