//! chainfill-core: gap-free block reconstruction from a filtered transaction feed.
//!
//! # Architecture
//!
//! ```text
//! feed ──push──▶ BlockAssembler ──publish──▶ BlockReader queue ◀──pull── consumer
//!                  ├── groups events by (block, rollback)       ├── get_next_block / get_block
//!                  ├── synthesizes blocks for skipped numbers   ├── seek_to_block
//!                  └── ListenerRegistry (observers)             └── head / irreversible watermarks
//! ```

pub mod assembler;
pub mod config;
pub mod cursor;
pub mod error;
pub mod listener;
pub mod reader;
pub mod types;

pub use assembler::BlockAssembler;
pub use config::ReaderConfig;
pub use cursor::{ReaderCursor, ReaderInfo};
pub use error::FillError;
pub use listener::{BlockListener, ListenerId, ListenerRegistry};
pub use reader::BlockReader;
pub use types::{
    Action, Authorization, Block, BlockInfo, BlockMeta, FeedMessage, MatchedAction, NextBlock,
    TransactionEvent,
};
