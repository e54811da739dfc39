//! Identifier newtypes.
//!
//! All identifiers are opaque strings on the wire. The newtypes keep room,
//! user, event and transaction ids from being mixed up in signatures.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtoError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a string without validation.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Room identifier (`!opaque:server`).
    RoomId
);
string_id!(
    /// User identifier (`@localpart:server`).
    UserId
);
string_id!(
    /// Server-assigned event identifier, or a local placeholder for echoes.
    EventId
);
string_id!(
    /// Client-chosen idempotence key for an outgoing event.
    TransactionId
);

impl UserId {
    /// Parse and validate a user id.
    pub fn parse(value: &str) -> Result<Self, ProtoError> {
        if !value.starts_with('@') {
            return Err(ProtoError::InvalidId { value: value.to_owned(), reason: "missing @" });
        }
        if !value.contains(':') {
            return Err(ProtoError::InvalidId {
                value: value.to_owned(),
                reason: "missing server name",
            });
        }
        Ok(Self(value.to_owned()))
    }

    /// The part between the sigil and the server name.
    pub fn localpart(&self) -> &str {
        localpart(&self.0)
    }
}

impl EventId {
    /// Placeholder id carried by a local echo until the server assigns one.
    pub fn local_echo(txn_id: &TransactionId) -> Self {
        Self(format!("~local.{txn_id}"))
    }

    /// Whether this id is a local echo placeholder.
    pub fn is_local_echo(&self) -> bool {
        self.0.starts_with("~local.")
    }
}

/// Strip the sigil and server name from a `<sigil>localpart:server` string.
///
/// Strings without a server part return everything after the sigil.
pub fn localpart(id: &str) -> &str {
    let without_sigil =
        id.strip_prefix(|c: char| matches!(c, '@' | '#' | '!' | '$' | '+')).unwrap_or(id);
    without_sigil.split_once(':').map_or(without_sigil, |(local, _)| local)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn user_localpart() {
        let user = UserId::parse("@alice:example.org").unwrap();
        assert_eq!(user.localpart(), "alice");
    }

    #[test]
    fn alias_localpart() {
        assert_eq!(localpart("#lobby:example.org"), "lobby");
        assert_eq!(localpart("#lobby"), "lobby");
    }

    #[test]
    fn parse_rejects_missing_sigil() {
        assert!(matches!(UserId::parse("alice:example.org"), Err(ProtoError::InvalidId { .. })));
        assert!(matches!(UserId::parse("@alice"), Err(ProtoError::InvalidId { .. })));
    }

    #[test]
    fn local_echo_ids_are_recognisable() {
        let id = EventId::local_echo(&TransactionId::new("abc1"));
        assert!(id.is_local_echo());
        assert!(!EventId::new("$server").is_local_echo());
    }
}
