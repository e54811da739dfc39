//! Protocol decoding errors.

use thiserror::Error;

/// Errors from decoding wire payloads.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Input was not valid JSON or did not match the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Identifier did not carry its sigil or server part.
    #[error("invalid identifier {value:?}: {reason}")]
    InvalidId {
        /// The rejected identifier.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}
