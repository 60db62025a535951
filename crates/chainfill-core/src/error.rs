//! Error types for the chainfill pipeline.

use thiserror::Error;

/// Errors surfaced by the block assembler, the block reader and the feed boundary.
#[derive(Debug, Error)]
pub enum FillError {
    #[error("block {requested} is behind the queue head {queue_head} and no longer retained")]
    UnresolvableBlock { requested: u64, queue_head: u64 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("feed error: {0}")]
    Feed(String),

    #[error("malformed feed message: {0}")]
    Decode(String),
}

impl FillError {
    /// Returns `true` if retrying the same request can never succeed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnresolvableBlock { .. } | Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(FillError::UnresolvableBlock { requested: 1, queue_head: 5 }.is_fatal());
        assert!(FillError::Config("x".into()).is_fatal());
        assert!(!FillError::Feed("disconnected".into()).is_fatal());
        assert!(!FillError::Decode("bad json".into()).is_fatal());
    }

    #[test]
    fn unresolvable_message_names_both_numbers() {
        let e = FillError::UnresolvableBlock { requested: 3, queue_head: 9 };
        let msg = e.to_string();
        assert!(msg.contains('3') && msg.contains('9'));
    }
}
