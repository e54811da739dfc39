//! Reversible stand-in for an encryption collaborator.
//!
//! "Ciphertext" is the JSON of the inner `{type, content}` pair. Only
//! envelopes naming the configured session open; anything else is an
//! unknown session, which exercises the keep-the-envelope path.

use parlor_core::{Crypto, CryptoError};
use parlor_proto::{RawEvent, RoomId, event_type};
use serde_json::{Value, json};

/// Megolm algorithm name carried in envelopes.
pub const ALGORITHM: &str = "m.megolm.v1.aes-sha2";

/// [`Crypto`] that seals by serialization.
#[derive(Debug, Clone)]
pub struct TestCrypto {
    session_id: String,
}

impl TestCrypto {
    /// Crypto holding exactly one session.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self { session_id: session_id.into() }
    }

    /// Envelope content for an inner event under `session_id`.
    pub fn envelope(session_id: &str, event_type: &str, content: &Value) -> Value {
        let inner = json!({"type": event_type, "content": content});
        json!({
            "algorithm": ALGORITHM,
            "session_id": session_id,
            "ciphertext": inner.to_string(),
        })
    }
}

impl Crypto for TestCrypto {
    fn decrypt(&self, _room_id: &RoomId, event: &RawEvent) -> Result<RawEvent, CryptoError> {
        if event.event_type != event_type::ENCRYPTED {
            return Err(CryptoError::Malformed { reason: "not an envelope".to_owned() });
        }
        let session_id =
            event.content.get("session_id").and_then(Value::as_str).unwrap_or_default();
        if session_id != self.session_id {
            return Err(CryptoError::UnknownSession { session_id: session_id.to_owned() });
        }

        let inner: Value = event
            .content
            .get("ciphertext")
            .and_then(Value::as_str)
            .and_then(|ciphertext| serde_json::from_str(ciphertext).ok())
            .ok_or_else(|| CryptoError::Malformed { reason: "unreadable ciphertext".to_owned() })?;
        let inner_type = inner
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CryptoError::Malformed { reason: "missing inner type".to_owned() })?;

        Ok(RawEvent {
            event_type: inner_type.to_owned(),
            content: inner.get("content").cloned().unwrap_or(Value::Null),
            ..event.clone()
        })
    }

    fn encrypt(
        &self,
        _room_id: &RoomId,
        event_type: &str,
        content: &Value,
    ) -> Result<Value, CryptoError> {
        Ok(Self::envelope(&self.session_id, event_type, content))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parlor_proto::{EventId, UserId};

    use super::*;

    fn sealed(session: &str) -> RawEvent {
        RawEvent::new(
            event_type::ENCRYPTED,
            None,
            UserId::new("@a:x"),
            EventId::new("$e"),
            1,
            TestCrypto::envelope(session, "m.room.message", &json!({"body": "hi"})),
        )
    }

    #[test]
    fn opens_own_session() {
        let crypto = TestCrypto::new("s1");
        let plain = crypto.decrypt(&RoomId::new("!r:x"), &sealed("s1")).unwrap();
        assert_eq!(plain.event_type, "m.room.message");
        assert_eq!(plain.content["body"], "hi");
        assert_eq!(plain.event_id, EventId::new("$e"));
    }

    #[test]
    fn foreign_session_is_unknown() {
        let crypto = TestCrypto::new("s1");
        let err = crypto.decrypt(&RoomId::new("!r:x"), &sealed("s2")).unwrap_err();
        assert!(matches!(err, CryptoError::UnknownSession { session_id } if session_id == "s2"));
    }
}
