//! Wire decoding for feed messages.
//!
//! Transactions arrive shaped like a `searchTransactionsForward` result,
//! optionally still wrapped in the GraphQL `data` envelope:
//!
//! ```json
//! { "undo": false, "irreversibleBlockNum": 41, "cursor": "…",
//!   "trace": { "id": "…",
//!              "block": { "num": 42, "id": "…", "previous": "…", "timestamp": "…" },
//!              "matchingActions": [{ "account": "…", "name": "…", "data": {},
//!                                    "authorization": [{ "actor": "…", "permission": "…" }] }] } }
//! ```
//!
//! A live marker is `{ "liveMarker": true }`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainfill_core::error::FillError;
use chainfill_core::types::{Authorization, FeedMessage, MatchedAction, TransactionEvent};

/// A transaction as carried on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTransaction {
    pub undo: bool,
    pub irreversible_block_num: u64,
    #[serde(default)]
    pub cursor: String,
    pub trace: WireTrace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTrace {
    pub id: String,
    pub block: WireBlock,
    #[serde(default)]
    pub matching_actions: Vec<WireAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireBlock {
    pub num: u64,
    pub id: String,
    pub previous: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireAction {
    pub account: String,
    pub name: String,
    #[serde(default, alias = "json")]
    pub data: Value,
    #[serde(default)]
    pub authorization: Vec<Authorization>,
}

impl From<WireTransaction> for TransactionEvent {
    fn from(wire: WireTransaction) -> Self {
        let WireTransaction {
            undo,
            irreversible_block_num,
            cursor,
            trace,
        } = wire;
        Self {
            transaction_id: trace.id,
            block_number: trace.block.num,
            block_hash: trace.block.id,
            previous_block_hash: trace.block.previous,
            timestamp: trace.block.timestamp,
            is_rollback: undo,
            last_irreversible_block_number: irreversible_block_num,
            matching_actions: trace
                .matching_actions
                .into_iter()
                .map(|a| MatchedAction {
                    account: a.account,
                    name: a.name,
                    authorization: a.authorization,
                    data: a.data,
                })
                .collect(),
            cursor,
        }
    }
}

/// Decode one feed message from its JSON value.
pub fn decode_message(value: &Value) -> Result<FeedMessage, FillError> {
    let payload = value
        .pointer("/data/searchTransactionsForward")
        .unwrap_or(value);

    if payload.get("liveMarker").and_then(Value::as_bool) == Some(true) {
        return Ok(FeedMessage::LiveMarker);
    }

    let wire: WireTransaction = serde_json::from_value(payload.clone())
        .map_err(|e| FillError::Decode(e.to_string()))?;
    Ok(FeedMessage::Transaction(wire.into()))
}

/// Decode one feed message from a JSON text.
pub fn decode_line(line: &str) -> Result<FeedMessage, FillError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| FillError::Decode(e.to_string()))?;
    decode_message(&value)
}
