//! Encryption collaborator interface.
//!
//! Key exchange and ciphers live outside the engine. The engine only needs to
//! open an envelope when admitting state and to seal outgoing content right
//! before it leaves the client.

use parlor_proto::{RawEvent, RoomId};
use serde_json::Value;
use thiserror::Error;

/// Errors reported by the encryption collaborator.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No session key for the envelope.
    #[error("unknown session: {session_id}")]
    UnknownSession {
        /// Session the envelope claims.
        session_id: String,
    },

    /// Envelope could not be parsed or authenticated.
    #[error("malformed envelope: {reason}")]
    Malformed {
        /// What was wrong with it.
        reason: String,
    },

    /// Encryption is configured but not usable right now.
    #[error("encryption unavailable: {reason}")]
    Unavailable {
        /// Why it is unavailable.
        reason: String,
    },
}

/// Decrypts and encrypts room events.
pub trait Crypto: Send + Sync {
    /// Open an `m.room.encrypted` envelope.
    ///
    /// Returns the plaintext event with its inner type and content; ids,
    /// sender and timestamps are those of the envelope.
    fn decrypt(&self, room_id: &RoomId, event: &RawEvent) -> Result<RawEvent, CryptoError>;

    /// Seal content into an `m.room.encrypted` envelope payload.
    fn encrypt(
        &self,
        room_id: &RoomId,
        event_type: &str,
        content: &Value,
    ) -> Result<Value, CryptoError>;
}
