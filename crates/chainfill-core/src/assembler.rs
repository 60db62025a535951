//! Block assembler: folds a filtered transaction feed into a contiguous
//! sequence of block records.
//!
//! The feed only reports blocks containing a matching transaction. The
//! assembler groups consecutive events sharing `(block_number, is_rollback)`
//! into one in-progress block and publishes it once an event for a different
//! key arrives. Before publishing, every block number skipped since the last
//! publication is filled with a synthetic, action-less record:
//!
//! ```text
//! feed:       #3 ─ #3 ─ #6 ──────────── #7
//! published:            #3   #4* #5* #6          (* synthetic)
//! hashes:          prev(#4)=hash(#3)
//!                  hash(#5)=prev(#6)
//! ```
//!
//! Only the last synthetic block of a gap gets a concrete hash (the real
//! successor's parent hash); interior ones stay empty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex;

use crate::listener::{BlockListener, ListenerId, ListenerRegistry};
use crate::types::{Action, Block, BlockInfo, BlockMeta, FeedMessage, NextBlock, TransactionEvent};

/// The last record handed to listeners.
#[derive(Debug, Clone)]
struct Published {
    number: u64,
    hash: String,
}

#[derive(Debug, Default)]
struct AssemblerState {
    /// Block currently being accumulated; `None` until the first event.
    in_progress: Option<NextBlock>,
    last_published: Option<Published>,
}

/// Converts transaction events into gap-free block records.
///
/// Event processing is serialized through a FIFO-fair async mutex, so the
/// multi-step gap fill of one event never interleaves with another.
pub struct BlockAssembler {
    state: Mutex<AssemblerState>,
    listeners: ListenerRegistry,
    live_marker_reached: AtomicBool,
    active_cursor: StdMutex<String>,
    /// First block number of interest; `None` in tail mode.
    low_block_num: Option<u64>,
}

impl BlockAssembler {
    /// Create an assembler for a stream starting at `start_at_block`.
    ///
    /// Values `>= 1` are absolute block numbers and gaps are filled from
    /// there on; values `<= 0` select tail mode, where nothing is
    /// synthesized before the first published block.
    pub fn new(start_at_block: i64) -> Self {
        let low_block_num = u64::try_from(start_at_block).ok().filter(|n| *n >= 1);
        tracing::trace!(start_at_block, tail_mode = low_block_num.is_none(), "BlockAssembler created");
        Self {
            state: Mutex::new(AssemblerState::default()),
            listeners: ListenerRegistry::new(),
            live_marker_reached: AtomicBool::new(false),
            active_cursor: StdMutex::new(String::new()),
            low_block_num,
        }
    }

    /// Register a listener for published records.
    pub fn add_on_block_listener(&self, listener: Arc<dyn BlockListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Remove a listener; takes effect for subsequent publications.
    pub fn remove_on_block_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Returns `true` once the feed has signalled it caught up with the head.
    /// Never resets.
    pub fn is_live_marker_reached(&self) -> bool {
        self.live_marker_reached.load(Ordering::Acquire)
    }

    /// Feed cursor of the last processed transaction (empty before the first).
    pub fn active_cursor(&self) -> String {
        self.active_cursor.lock().unwrap().clone()
    }

    /// Process exactly one feed message.
    ///
    /// All records completed by this message are delivered to the listeners,
    /// in order, before the returned future resolves.
    pub async fn on_transaction_received(&self, message: FeedMessage) {
        let event = match message {
            FeedMessage::LiveMarker => {
                if !self.live_marker_reached.swap(true, Ordering::AcqRel) {
                    tracing::info!("Live marker reached");
                }
                return;
            }
            FeedMessage::Transaction(event) => event,
        };

        let mut state = self.state.lock().await;

        self.listeners
            .notify_progress(event.block_number, event.last_irreversible_block_number);

        let is_boundary = match &state.in_progress {
            Some(current) => {
                current.number() != event.block_number || current.is_rollback() != event.is_rollback
            }
            None => true,
        };

        if is_boundary {
            if let Some(completed) = state.in_progress.take() {
                if !event.is_rollback && event.block_number < completed.number() {
                    tracing::warn!(
                        previous = completed.number(),
                        received = event.block_number,
                        "Feed moved backwards without a rollback flag"
                    );
                }
                self.fill_gap(&mut state, &completed);
                self.publish(&mut state, completed);
            }
            state.in_progress = Some(open_block(&event));
        }

        if let Some(current) = state.in_progress.as_mut() {
            current.block.actions.extend(
                event
                    .matching_actions
                    .into_iter()
                    .enumerate()
                    .map(|(i, matched)| Action::from_matched(&event.transaction_id, i as u32, matched)),
            );
        }

        *self.active_cursor.lock().unwrap() = event.cursor;
    }

    /// Publish synthetic records for every number strictly between the last
    /// published block (or the start block) and `completed`.
    fn fill_gap(&self, state: &mut AssemblerState, completed: &NextBlock) {
        let base = match &state.last_published {
            Some(published) => published.number,
            None => match self.low_block_num {
                Some(low) => low - 1,
                None => return,
            },
        };
        let target = completed.number();
        if target <= base + 1 {
            return;
        }

        tracing::debug!(from = base + 1, to = target - 1, "Filling block gap");

        for number in (base + 1)..target {
            let previous = state
                .last_published
                .as_ref()
                .map(|p| p.hash.clone())
                .unwrap_or_default();
            let hash = if number == target - 1 {
                completed.block.block_info.previous_block_hash.clone()
            } else {
                String::new()
            };
            let dummy = NextBlock::synthetic(
                Block::synthetic(number, hash, previous),
                completed.last_irreversible_block_number,
            );
            self.publish(state, dummy);
        }
    }

    fn publish(&self, state: &mut AssemblerState, mut record: NextBlock) {
        record.block_meta.is_earliest_block = state.last_published.is_none();
        state.last_published = Some(Published {
            number: record.number(),
            hash: record.block.hash().to_string(),
        });
        tracing::trace!(
            block = record.number(),
            actions = record.block.actions.len(),
            rollback = record.is_rollback(),
            earliest = record.block_meta.is_earliest_block,
            "Publishing block"
        );
        self.listeners.notify_block(&record);
    }
}

/// Start a new in-progress block keyed by the event's block and rollback flag.
fn open_block(event: &TransactionEvent) -> NextBlock {
    NextBlock {
        block: Block {
            block_info: BlockInfo {
                block_number: event.block_number,
                block_hash: event.block_hash.clone(),
                previous_block_hash: event.previous_block_hash.clone(),
                timestamp: event.timestamp,
            },
            actions: Vec::new(),
        },
        block_meta: BlockMeta {
            is_new_block: true,
            is_rollback: event.is_rollback,
            is_earliest_block: false,
        },
        last_irreversible_block_number: event.last_irreversible_block_number,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MatchedAction;
    use chrono::{DateTime, Utc};

    fn tx(block_number: u64, undo: bool) -> FeedMessage {
        tx_with(block_number, undo, &[])
    }

    fn tx_with(block_number: u64, undo: bool, actions: &[&str]) -> FeedMessage {
        FeedMessage::Transaction(TransactionEvent {
            transaction_id: format!("trx-{block_number}"),
            block_number,
            block_hash: format!("hash-{block_number}"),
            previous_block_hash: format!("hash-{}", block_number - 1),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            is_rollback: undo,
            last_irreversible_block_number: 5,
            matching_actions: actions
                .iter()
                .map(|name| MatchedAction {
                    account: "eosio.token".into(),
                    name: (*name).into(),
                    authorization: vec![],
                    data: serde_json::Value::Null,
                })
                .collect(),
            cursor: format!("cursor-{block_number}"),
        })
    }

    fn collecting(assembler: &BlockAssembler) -> Arc<StdMutex<Vec<NextBlock>>> {
        let out = Arc::new(StdMutex::new(Vec::new()));
        let sink = out.clone();
        assembler.add_on_block_listener(Arc::new(move |b: &NextBlock| {
            sink.lock().unwrap().push(b.clone())
        }));
        out
    }

    #[tokio::test]
    async fn holds_block_until_boundary() {
        let assembler = BlockAssembler::new(3);
        let out = collecting(&assembler);

        for _ in 0..3 {
            assembler.on_transaction_received(tx(3, false)).await;
        }
        assert!(out.lock().unwrap().is_empty());

        assembler.on_transaction_received(tx(4, false)).await;
        assert_eq!(out.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn merges_actions_in_arrival_order() {
        let assembler = BlockAssembler::new(3);
        let out = collecting(&assembler);

        assembler.on_transaction_received(tx_with(3, false, &["a"])).await;
        assembler.on_transaction_received(tx_with(3, false, &["b"])).await;
        assembler.on_transaction_received(tx(4, false)).await;

        let out = out.lock().unwrap();
        let names: Vec<_> = out[0].block.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn fills_gaps_with_chained_dummies() {
        let assembler = BlockAssembler::new(3);
        let out = collecting(&assembler);

        assembler.on_transaction_received(tx(3, false)).await;
        assembler.on_transaction_received(tx(6, false)).await;
        assembler.on_transaction_received(tx(7, false)).await;

        let out = out.lock().unwrap();
        let numbers: Vec<_> = out.iter().map(NextBlock::number).collect();
        assert_eq!(numbers, vec![3, 4, 5, 6]);

        // #4: interior dummy, linked to #3
        assert_eq!(out[1].block.block_info.previous_block_hash, "hash-3");
        assert_eq!(out[1].block.hash(), "");
        // #5: last dummy, bridges to #6
        assert_eq!(out[2].block.block_info.previous_block_hash, "");
        assert_eq!(out[2].block.hash(), "hash-5");
        assert_eq!(out[3].block.block_info.previous_block_hash, out[2].block.hash());
        assert!(out[1].block.actions.is_empty() && out[2].block.actions.is_empty());
        assert!(!out[1].is_rollback() && out[1].block_meta.is_new_block);
    }

    #[tokio::test]
    async fn fills_from_start_block_before_first_publication() {
        let assembler = BlockAssembler::new(3);
        let out = collecting(&assembler);

        assembler.on_transaction_received(tx(5, false)).await;
        assembler.on_transaction_received(tx(6, false)).await;

        let out = out.lock().unwrap();
        let numbers: Vec<_> = out.iter().map(NextBlock::number).collect();
        assert_eq!(numbers, vec![3, 4, 5]);
        assert!(out[0].block_meta.is_earliest_block);
        assert!(out[1..].iter().all(|b| !b.block_meta.is_earliest_block));
        assert_eq!(out[1].block.hash(), "hash-4");
    }

    #[tokio::test]
    async fn tail_mode_does_not_fill_before_first_block() {
        let assembler = BlockAssembler::new(-10);
        let out = collecting(&assembler);

        assembler.on_transaction_received(tx(500, false)).await;
        assembler.on_transaction_received(tx(502, false)).await;
        assembler.on_transaction_received(tx(503, false)).await;

        let numbers: Vec<_> = out.lock().unwrap().iter().map(NextBlock::number).collect();
        assert_eq!(numbers, vec![500, 501, 502]);
    }

    #[tokio::test]
    async fn earliest_flag_only_on_first_record() {
        let assembler = BlockAssembler::new(3);
        let out = collecting(&assembler);

        for n in [3, 4, 5] {
            assembler.on_transaction_received(tx(n, false)).await;
        }

        let out = out.lock().unwrap();
        assert!(out[0].block_meta.is_earliest_block);
        assert!(!out[1].block_meta.is_earliest_block);
    }

    #[tokio::test]
    async fn rollback_flag_change_is_a_boundary() {
        let assembler = BlockAssembler::new(3);
        let out = collecting(&assembler);

        assembler.on_transaction_received(tx(3, false)).await;
        assembler.on_transaction_received(tx(3, true)).await;
        assembler.on_transaction_received(tx(4, false)).await;

        let out = out.lock().unwrap();
        assert_eq!(out.len(), 2);
        assert!(!out[0].is_rollback());
        assert!(out[1].is_rollback());
        assert_eq!(out[1].number(), 3);
    }

    #[tokio::test]
    async fn live_marker_does_not_publish() {
        let assembler = BlockAssembler::new(1);
        let out = collecting(&assembler);

        assert!(!assembler.is_live_marker_reached());
        assembler.on_transaction_received(FeedMessage::LiveMarker).await;
        assert!(assembler.is_live_marker_reached());
        assert!(out.lock().unwrap().is_empty());

        assembler.on_transaction_received(tx(1, false)).await;
        assert!(assembler.is_live_marker_reached());
    }

    #[tokio::test]
    async fn tracks_active_cursor() {
        let assembler = BlockAssembler::new(1);
        assert_eq!(assembler.active_cursor(), "");
        assembler.on_transaction_received(tx(2, false)).await;
        assert_eq!(assembler.active_cursor(), "cursor-2");
    }

    #[tokio::test]
    async fn removed_listener_sees_nothing() {
        let assembler = BlockAssembler::new(3);
        let out = Arc::new(StdMutex::new(0));
        let c = out.clone();
        let id = assembler.add_on_block_listener(Arc::new(move |_: &NextBlock| {
            *c.lock().unwrap() += 1
        }));
        assert!(assembler.remove_on_block_listener(id));

        assembler.on_transaction_received(tx(3, false)).await;
        assembler.on_transaction_received(tx(4, false)).await;
        assert_eq!(*out.lock().unwrap(), 0);
    }
}
