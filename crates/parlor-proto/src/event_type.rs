//! Event-type taxonomy.
//!
//! Splits event types into state types (one resident value per state key) and
//! message-like types (no state key). Unknown types are classified by whether
//! the event carries a state key.

use serde_json::Value;

/// `m.room.create`
pub const CREATE: &str = "m.room.create";
/// `m.room.name`
pub const NAME: &str = "m.room.name";
/// `m.room.topic`
pub const TOPIC: &str = "m.room.topic";
/// `m.room.avatar`
pub const AVATAR: &str = "m.room.avatar";
/// `m.room.canonical_alias`
pub const CANONICAL_ALIAS: &str = "m.room.canonical_alias";
/// `m.room.member`
pub const MEMBER: &str = "m.room.member";
/// `m.room.power_levels`
pub const POWER_LEVELS: &str = "m.room.power_levels";
/// `m.room.join_rules`
pub const JOIN_RULES: &str = "m.room.join_rules";
/// `m.room.guest_access`
pub const GUEST_ACCESS: &str = "m.room.guest_access";
/// `m.room.history_visibility`
pub const HISTORY_VISIBILITY: &str = "m.room.history_visibility";
/// `m.room.encryption`
pub const ENCRYPTION: &str = "m.room.encryption";
/// `m.room.pinned_events`
pub const PINNED_EVENTS: &str = "m.room.pinned_events";
/// `m.room.tombstone`
pub const TOMBSTONE: &str = "m.room.tombstone";
/// `im.ponies.room_emotes`
pub const ROOM_EMOTES: &str = "im.ponies.room_emotes";

/// `m.room.message`
pub const MESSAGE: &str = "m.room.message";
/// `m.sticker`
pub const STICKER: &str = "m.sticker";
/// `m.room.encrypted`
pub const ENCRYPTED: &str = "m.room.encrypted";
/// `m.reaction`
pub const REACTION: &str = "m.reaction";
/// `m.room.redaction`
pub const REDACTION: &str = "m.room.redaction";

/// `m.typing` (ephemeral)
pub const TYPING: &str = "m.typing";
/// `m.receipt` (ephemeral)
pub const RECEIPT: &str = "m.receipt";

/// `m.fully_read` (room account data)
pub const FULLY_READ: &str = "m.fully_read";
/// `m.marked_unread` (room account data)
pub const MARKED_UNREAD: &str = "m.marked_unread";
/// `m.tag` (room account data)
pub const TAG: &str = "m.tag";

/// `m.direct` (global account data)
pub const DIRECT: &str = "m.direct";
/// `m.push_rules` (global account data)
pub const PUSH_RULES: &str = "m.push_rules";
/// `im.ponies.user_emotes` (global account data)
pub const USER_EMOTES: &str = "im.ponies.user_emotes";
/// `im.ponies.emote_rooms` (global account data)
pub const EMOTE_ROOMS: &str = "im.ponies.emote_rooms";

const VERIFICATION_PREFIX: &str = "m.key.verification.";
const VERIFICATION_REQUEST_MSGTYPE: &str = "m.key.verification.request";

const KNOWN_STATE_TYPES: &[&str] = &[
    CREATE,
    NAME,
    TOPIC,
    AVATAR,
    CANONICAL_ALIAS,
    MEMBER,
    POWER_LEVELS,
    JOIN_RULES,
    GUEST_ACCESS,
    HISTORY_VISIBILITY,
    ENCRYPTION,
    PINNED_EVENTS,
    TOMBSTONE,
    ROOM_EMOTES,
];

/// Whether an event type is a state type or a message-like type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Resident per (type, state key); carries a state key.
    State,
    /// Timeline-only; must not carry a state key.
    MessageLike,
}

impl EventKind {
    /// Classify an event type.
    ///
    /// Known types are classified by the taxonomy; unknown types by whether
    /// the event carries a state key.
    pub fn classify(event_type: &str, has_state_key: bool) -> Self {
        if is_message_like(event_type) {
            Self::MessageLike
        } else if is_known_state(event_type) || has_state_key {
            Self::State
        } else {
            Self::MessageLike
        }
    }
}

/// Message-like types known to the taxonomy.
pub fn is_message_like(event_type: &str) -> bool {
    matches!(event_type, MESSAGE | STICKER | ENCRYPTED | REACTION | REDACTION)
        || event_type.starts_with("m.call.")
        || event_type.starts_with(VERIFICATION_PREFIX)
}

/// State types known to the taxonomy.
pub fn is_known_state(event_type: &str) -> bool {
    KNOWN_STATE_TYPES.contains(&event_type)
}

/// Whether an event belongs to the key verification flow.
///
/// Verification traffic is never admitted into room state, whatever its shape.
pub fn is_verification(event_type: &str, content: &Value) -> bool {
    if event_type.starts_with(VERIFICATION_PREFIX) {
        return true;
    }
    event_type == MESSAGE
        && content.get("msgtype").and_then(Value::as_str) == Some(VERIFICATION_REQUEST_MSGTYPE)
}
