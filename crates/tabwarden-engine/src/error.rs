//! Error types for host calls and engine operations.

use thiserror::Error;

use tabwarden_db::StoreError;

/// Normalized error for live environment calls. Adapters map their transport
/// failures into these categories so the engine can tell "the item is gone"
/// apart from "the host is broken".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The referenced tab, group, or window no longer exists live.
    #[error("host item {id} not found")]
    MissingItem { id: i64 },

    /// The host cannot be reached or refused the connection.
    #[error("host unavailable: {0}")]
    Unavailable(String),

    /// The host answered with something the adapter could not interpret.
    #[error("host protocol error: {0}")]
    Protocol(String),
}

impl HostError {
    /// Whether the failure means the target item vanished, which most engine
    /// operations treat as already-done rather than fatal.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingItem { .. })
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Host(#[from] HostError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_item_is_recognized() {
        assert!(HostError::MissingItem { id: 9 }.is_missing());
        assert!(!HostError::Unavailable("gone".into()).is_missing());
        assert!(!HostError::Protocol("bad frame".into()).is_missing());
    }

    #[test]
    fn engine_error_wraps_sources() {
        let from_store = EngineError::from(StoreError::TabNotFound);
        assert!(matches!(from_store, EngineError::Store(_)));

        let from_host = EngineError::from(HostError::Unavailable("refused".into()));
        assert_eq!(from_host.to_string(), "host unavailable: refused");
    }
}
