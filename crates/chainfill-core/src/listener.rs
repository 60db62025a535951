//! Block listener trait + registry.
//!
//! The assembler publishes every completed record to the registered
//! listeners, in registration order. Notification walks a snapshot of the
//! registry, so a listener may deregister itself (or others) from inside
//! its own callback; the change applies from the next publication on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::types::NextBlock;

/// Handle returned on registration, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Receives the assembler's output.
///
/// Callbacks run synchronously on the assembler's processing path and
/// must not block.
pub trait BlockListener: Send + Sync {
    /// Called once per published record (real or synthetic), in emission order.
    fn on_block(&self, block: &NextBlock);

    /// Called for every transaction event with its block number and
    /// irreversibility watermark, before any record it completes is published.
    fn on_progress(&self, _block_number: u64, _last_irreversible_block_number: u64) {}
}

impl<F> BlockListener for F
where
    F: Fn(&NextBlock) + Send + Sync,
{
    fn on_block(&self, block: &NextBlock) {
        self(block)
    }
}

/// Ordered set of block listeners.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: RwLock<Vec<(ListenerId, Arc<dyn BlockListener>)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it is invoked after all previously registered ones.
    pub fn add(&self, listener: Arc<dyn BlockListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().unwrap().push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if `id` was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write().unwrap();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Returns `true` if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn BlockListener>> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    /// Deliver a published record to every listener.
    pub fn notify_block(&self, block: &NextBlock) {
        for listener in self.snapshot() {
            listener.on_block(block);
        }
    }

    /// Deliver a progress update to every listener.
    pub fn notify_progress(&self, block_number: u64, last_irreversible_block_number: u64) {
        for listener in self.snapshot() {
            listener.on_progress(block_number, last_irreversible_block_number);
        }
    }
}
