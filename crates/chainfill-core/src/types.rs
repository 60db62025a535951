//! Shared types for the block reconstruction pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Feed input ───────────────────────────────────────────────────────────────

/// A permission level authorizing an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub actor: String,
    pub permission: String,
}

/// An action matched by the feed query, as carried inside a transaction event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedAction {
    pub account: String,
    pub name: String,
    pub authorization: Vec<Authorization>,
    pub data: serde_json::Value,
}

/// One transaction pushed by the feed, tagged with the block it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    /// Transaction id.
    pub transaction_id: String,
    /// Number of the block containing the transaction.
    pub block_number: u64,
    /// Hash of the block containing the transaction.
    pub block_hash: String,
    /// Hash of that block's parent.
    pub previous_block_hash: String,
    /// Block production time.
    pub timestamp: DateTime<Utc>,
    /// `true` when the feed is undoing this transaction (fork switch).
    pub is_rollback: bool,
    /// Irreversibility watermark reported alongside the transaction.
    pub last_irreversible_block_number: u64,
    /// Actions of the transaction that matched the feed query, in order.
    pub matching_actions: Vec<MatchedAction>,
    /// Opaque feed position, used to resume a subscription.
    pub cursor: String,
}

/// A message delivered by the feed.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// A transaction belonging to some block.
    Transaction(TransactionEvent),
    /// Heartbeat meaning the feed has caught up with the chain head.
    LiveMarker,
}

// ─── Block output ─────────────────────────────────────────────────────────────

/// An action inside a reconstructed block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// `"{account}::{name}"`.
    #[serde(rename = "type")]
    pub action_type: String,
    pub transaction_id: String,
    /// Position of the action among its transaction's matching actions.
    pub action_index: u32,
    pub account: String,
    pub name: String,
    pub authorization: Vec<Authorization>,
    pub data: serde_json::Value,
}

impl Action {
    /// Build an action from a matched action of transaction `transaction_id`.
    pub fn from_matched(transaction_id: &str, action_index: u32, matched: MatchedAction) -> Self {
        Self {
            action_type: format!("{}::{}", matched.account, matched.name),
            transaction_id: transaction_id.to_string(),
            action_index,
            account: matched.account,
            name: matched.name,
            authorization: matched.authorization,
            data: matched.data,
        }
    }
}

/// Header fields of a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub block_number: u64,
    /// Empty for synthetic blocks that do not bridge to a known successor.
    pub block_hash: String,
    pub previous_block_hash: String,
    pub timestamp: DateTime<Utc>,
}

impl BlockInfo {
    /// Returns `true` if `parent` is the direct parent of `self`.
    pub fn extends(&self, parent: &BlockInfo) -> bool {
        self.block_number == parent.block_number + 1
            && self.previous_block_hash == parent.block_hash
    }
}

/// A block: header plus the actions the feed matched inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub block_info: BlockInfo,
    pub actions: Vec<Action>,
}

impl Block {
    /// A zero-action placeholder for a block the feed never reported.
    pub fn synthetic(
        block_number: u64,
        block_hash: impl Into<String>,
        previous_block_hash: impl Into<String>,
    ) -> Self {
        Self {
            block_info: BlockInfo {
                block_number,
                block_hash: block_hash.into(),
                previous_block_hash: previous_block_hash.into(),
                timestamp: DateTime::<Utc>::UNIX_EPOCH,
            },
            actions: Vec::new(),
        }
    }

    pub fn number(&self) -> u64 {
        self.block_info.block_number
    }

    pub fn hash(&self) -> &str {
        &self.block_info.block_hash
    }
}

/// Flags describing how a block relates to the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockMeta {
    pub is_new_block: bool,
    pub is_rollback: bool,
    /// Set on the first record the assembler ever publishes, and only there.
    pub is_earliest_block: bool,
}

/// The unit published by the assembler and served by the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextBlock {
    pub block: Block,
    pub block_meta: BlockMeta,
    pub last_irreversible_block_number: u64,
}

impl NextBlock {
    /// A synthetic, non-rollback record for `block`.
    pub fn synthetic(block: Block, last_irreversible_block_number: u64) -> Self {
        Self {
            block,
            block_meta: BlockMeta {
                is_new_block: true,
                is_rollback: false,
                is_earliest_block: false,
            },
            last_irreversible_block_number,
        }
    }

    pub fn number(&self) -> u64 {
        self.block.number()
    }

    pub fn is_rollback(&self) -> bool {
        self.block_meta.is_rollback
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn info(number: u64, hash: &str, previous: &str) -> BlockInfo {
        BlockInfo {
            block_number: number,
            block_hash: hash.into(),
            previous_block_hash: previous.into(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn block_extends_parent() {
        let parent = info(100, "aaa", "000");
        let child = info(101, "bbb", "aaa");
        assert!(child.extends(&parent));
        assert!(!parent.extends(&child));
    }

    #[test]
    fn block_extends_false_on_gap() {
        let a = info(100, "aaa", "000");
        let b = info(102, "ccc", "aaa");
        assert!(!b.extends(&a));
    }

    #[test]
    fn action_type_joins_account_and_name() {
        let action = Action::from_matched(
            "trx1",
            2,
            MatchedAction {
                account: "eosio.token".into(),
                name: "transfer".into(),
                authorization: vec![Authorization {
                    actor: "alice".into(),
                    permission: "active".into(),
                }],
                data: serde_json::json!({ "quantity": "1.0000 EOS" }),
            },
        );
        assert_eq!(action.action_type, "eosio.token::transfer");
        assert_eq!(action.action_index, 2);
        assert_eq!(action.transaction_id, "trx1");
    }

    #[test]
    fn synthetic_block_is_empty_and_dated_at_epoch() {
        let block = Block::synthetic(7, "", "abc");
        assert_eq!(block.number(), 7);
        assert!(block.actions.is_empty());
        assert_eq!(block.block_info.timestamp.timestamp(), 0);
        assert_eq!(block.block_info.previous_block_hash, "abc");
    }

    #[test]
    fn action_serializes_type_field() {
        let action = Action::from_matched(
            "trx1",
            0,
            MatchedAction {
                account: "a".into(),
                name: "b".into(),
                authorization: vec![],
                data: serde_json::Value::Null,
            },
        );
        let v = serde_json::to_value(&action).unwrap();
        assert_eq!(v["type"], "a::b");
    }
}
