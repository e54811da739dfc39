//! Client error types.

use std::time::Duration;

use parlor_core::CryptoError;
use parlor_proto::{RoomId, TransactionId};
use thiserror::Error;

/// Errors reported by the transport collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Network or server hiccup; safe to retry with the same transaction id.
    #[error("transient transport failure: {reason}")]
    Transient {
        /// Description of the failure.
        reason: String,
    },

    /// Server refused the request; retrying will not help.
    #[error("rejected by server: {errcode}")]
    Rejected {
        /// Protocol error code, e.g. `M_FORBIDDEN`.
        errcode: String,
    },

    /// Target does not exist (or no longer exists).
    #[error("not found")]
    NotFound,

    /// Server asked us to slow down.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Server-suggested delay.
        retry_after: Option<Duration>,
    },
}

impl TransportError {
    /// Whether a retry with the same transaction id may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::RateLimited { .. })
    }
}

/// Errors reported by the persistence collaborator.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Backend I/O failure.
    #[error("storage backend failure: {reason}")]
    Backend {
        /// Description of the failure.
        reason: String,
    },

    /// Stored snapshot could not be decoded.
    #[error("corrupt snapshot: {reason}")]
    Corrupt {
        /// Description of the decoding failure.
        reason: String,
    },
}

/// Errors from client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Room not known to the client.
    #[error("room not found: {room_id}")]
    RoomNotFound {
        /// The room that was not found.
        room_id: RoomId,
    },

    /// Outgoing content failed local validation; nothing was sent.
    #[error("invalid content: {reason}")]
    InvalidContent {
        /// What was wrong with it.
        reason: String,
    },

    /// Outgoing content exceeds the configured size limit.
    #[error("content too large: {size} bytes (max {max})")]
    ContentTooLarge {
        /// Serialized size.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Power levels forbid the operation.
    #[error("permission denied: cannot send {event_type}")]
    PermissionDenied {
        /// Event type that was refused.
        event_type: String,
    },

    /// Send ended in the terminal failed state.
    #[error("send {txn_id} failed: {reason}")]
    SendFailed {
        /// Transaction of the failed send.
        txn_id: TransactionId,
        /// Why it failed.
        reason: String,
    },

    /// Send was abandoned by the caller.
    #[error("send {txn_id} cancelled")]
    SendCancelled {
        /// Transaction of the cancelled send.
        txn_id: TransactionId,
    },

    /// No send with this transaction id is known.
    #[error("unknown transaction: {txn_id}")]
    UnknownTransaction {
        /// The unknown transaction.
        txn_id: TransactionId,
    },

    /// A pagination request is already running for this room.
    #[error("pagination already in flight for {room_id}")]
    PaginationInFlight {
        /// Room with the running request.
        room_id: RoomId,
    },

    /// Transport call failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Encryption collaborator failed.
    #[error("encryption error: {0}")]
    Crypto(#[from] CryptoError),

    /// Persistence collaborator failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Snapshot encoding or decoding failed.
    #[error("snapshot codec error: {reason}")]
    Snapshot {
        /// Description of the codec failure.
        reason: String,
    },

    /// Room is in an invalid state for the operation.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// Description of the state error.
        reason: String,
    },
}

impl ClientError {
    /// Returns true if this error is fatal (unrecoverable).
    ///
    /// Fatal errors indicate corrupt local data or bugs and call for a
    /// rebuild of the room. Transient errors can be recovered via retry or
    /// resync; caller mistakes are not fatal either.
    pub fn is_fatal(&self) -> bool {
        match self {
            // Fatal: local data or engine invariants are broken
            Self::InvalidState { .. } | Self::Snapshot { .. } => true,
            Self::Persistence(e) => matches!(e, PersistenceError::Corrupt { .. }),

            // Transient or caller-side: recoverable
            Self::RoomNotFound { .. }
            | Self::InvalidContent { .. }
            | Self::ContentTooLarge { .. }
            | Self::PermissionDenied { .. }
            | Self::SendFailed { .. }
            | Self::SendCancelled { .. }
            | Self::UnknownTransaction { .. }
            | Self::PaginationInFlight { .. }
            | Self::Transport(_)
            | Self::Crypto(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_not_found_is_transient() {
        let err = ClientError::RoomNotFound { room_id: RoomId::new("!r:x") };
        assert!(!err.is_fatal());
    }

    #[test]
    fn invalid_state_is_fatal() {
        let err = ClientError::InvalidState { reason: "counter crossed zero".to_string() };
        assert!(err.is_fatal());
    }

    #[test]
    fn corrupt_snapshot_is_fatal_but_backend_is_not() {
        let corrupt = ClientError::from(PersistenceError::Corrupt { reason: "eof".into() });
        let backend = ClientError::from(PersistenceError::Backend { reason: "disk".into() });
        assert!(corrupt.is_fatal());
        assert!(!backend.is_fatal());
    }

    #[test]
    fn rate_limit_is_transient() {
        assert!(TransportError::RateLimited { retry_after: None }.is_transient());
        assert!(!TransportError::Rejected { errcode: "M_FORBIDDEN".into() }.is_transient());
        assert!(!TransportError::NotFound.is_transient());
    }

    #[test]
    fn error_display() {
        let err = ClientError::ContentTooLarge { size: 70_000, max: 65_536 };
        assert_eq!(err.to_string(), "content too large: 70000 bytes (max 65536)");
    }
}
