//! chainfill-stream: feed boundary for the block engine.
//!
//! ```text
//! TransactionFeed ──FeedStream──▶ FeedDriver ──▶ BlockAssembler ──▶ BlockReader
//!  (external: connection,          (resubscribes from
//!   auth, reconnects)               the active cursor)
//! ```

pub mod builder;
pub mod feed;
pub mod wire;

use std::sync::Arc;

use chainfill_core::{BlockAssembler, BlockReader, FillError, ReaderConfig};
use tokio::task::JoinHandle;

pub use builder::ReaderBuilder;
pub use feed::{DriverMetrics, FeedDriver, FeedRequest, FeedStream, ReplayFeed, TransactionFeed};
pub use wire::{decode_line, decode_message};

/// Wire `feed` to a new assembler and reader, and start pumping.
///
/// The reader subscribes before the driver task starts, so no block is
/// missed. Must be called from within a Tokio runtime.
pub fn connect<F>(
    config: ReaderConfig,
    feed: F,
) -> Result<(BlockReader, JoinHandle<()>), FillError>
where
    F: TransactionFeed + 'static,
{
    config.validate()?;
    let assembler = Arc::new(BlockAssembler::new(config.start_at_block));
    let reader = BlockReader::new(config.clone(), assembler.clone())?;
    let driver = FeedDriver::new(feed, assembler, config);
    let handle = tokio::spawn(async move { driver.run().await });
    Ok((reader, handle))
}
