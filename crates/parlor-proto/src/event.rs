//! Raw and admitted events.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EventId, ProtoError, RoomContent, TransactionId, UserId, event_type};

/// Position of an event in a room's local total order.
///
/// Forward keys are positive and grow from wall-clock milliseconds; backward
/// keys are non-positive and shrink from zero. Any forward key compares
/// greater than any backward key.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct OrderingKey(i64);

impl OrderingKey {
    /// The origin shared by both ranges.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw value.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw value.
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for OrderingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery status carried by every admitted event.
///
/// Ordered by progress: a failed echo is "less delivered" than one still
/// sending.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Local echo whose send terminally failed.
    Failed,
    /// Local echo awaiting the server.
    Sending,
    /// Accepted by the server, not yet seen in sync.
    Sent,
    /// Delivered by sync or pagination.
    #[default]
    Synced,
}

/// Event as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// State key; absent for message-like events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    /// Sending user.
    pub sender: UserId,
    /// Event id.
    pub event_id: EventId,
    /// Origin server timestamp in milliseconds.
    #[serde(default)]
    pub origin_server_ts: u64,
    /// Untyped content.
    #[serde(default)]
    pub content: Value,
    /// Unsigned data (transaction id, age, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsigned: Option<Value>,
    /// Redaction target for older room versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<EventId>,
}

impl RawEvent {
    /// Build an event with empty unsigned data.
    pub fn new(
        event_type: impl Into<String>,
        state_key: Option<String>,
        sender: UserId,
        event_id: EventId,
        origin_server_ts: u64,
        content: Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            state_key,
            sender,
            event_id,
            origin_server_ts,
            content,
            unsigned: None,
            redacts: None,
        }
    }

    /// Parse an event from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Transaction id echoed back by the server for our own sends.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.unsigned
            .as_ref()
            .and_then(|unsigned| unsigned.get("transaction_id"))
            .and_then(Value::as_str)
            .map(TransactionId::from)
    }

    /// Attach a transaction id to the unsigned block.
    #[must_use]
    pub fn with_transaction_id(mut self, txn_id: &TransactionId) -> Self {
        let mut unsigned = match self.unsigned.take() {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        unsigned.insert("transaction_id".to_owned(), Value::String(txn_id.to_string()));
        self.unsigned = Some(Value::Object(unsigned));
        self
    }
}

/// An event admitted to a room, immutable once built.
///
/// Content is decoded once on construction. Updates produce a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredEvent", into = "StoredEvent")]
pub struct StateEvent {
    raw: RawEvent,
    content: RoomContent,
    ordering_key: OrderingKey,
    status: EventStatus,
}

impl StateEvent {
    /// Admit a raw event at the given ordering key with `Synced` status.
    pub fn new(raw: RawEvent, ordering_key: OrderingKey) -> Self {
        Self::with_status(raw, ordering_key, EventStatus::Synced)
    }

    /// Admit a raw event with an explicit status.
    pub fn with_status(raw: RawEvent, ordering_key: OrderingKey, status: EventStatus) -> Self {
        let content = RoomContent::decode(&raw.event_type, &raw.content);
        Self { raw, content, ordering_key, status }
    }

    /// Event type.
    pub fn event_type(&self) -> &str {
        &self.raw.event_type
    }

    /// State key as delivered, `None` for message-like events.
    pub fn state_key(&self) -> Option<&str> {
        self.raw.state_key.as_deref()
    }

    /// Sending user.
    pub fn sender(&self) -> &UserId {
        &self.raw.sender
    }

    /// Event id (a local placeholder for unconfirmed echoes).
    pub fn event_id(&self) -> &EventId {
        &self.raw.event_id
    }

    /// Origin server timestamp in milliseconds.
    pub fn origin_server_ts(&self) -> u64 {
        self.raw.origin_server_ts
    }

    /// Decoded content.
    pub fn content(&self) -> &RoomContent {
        &self.content
    }

    /// Untyped content as delivered.
    pub fn raw_content(&self) -> &Value {
        &self.raw.content
    }

    /// Full raw event.
    pub fn raw(&self) -> &RawEvent {
        &self.raw
    }

    /// Local ordering key.
    pub fn ordering_key(&self) -> OrderingKey {
        self.ordering_key
    }

    /// Delivery status.
    pub fn status(&self) -> EventStatus {
        self.status
    }

    /// Transaction id, set on our own events.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.raw.transaction_id()
    }

    /// Whether this is a still-encrypted envelope.
    pub fn is_encrypted(&self) -> bool {
        self.raw.event_type == event_type::ENCRYPTED
    }

    /// Copy with a different status.
    #[must_use]
    pub fn with_new_status(&self, status: EventStatus) -> Self {
        Self { status, ..self.clone() }
    }

    /// Copy carrying the server-assigned id. The ordering key is kept.
    #[must_use]
    pub fn confirmed(&self, event_id: EventId) -> Self {
        let mut next = self.clone();
        next.raw.event_id = event_id;
        next.status = EventStatus::Sent;
        next
    }

    /// Copy placed at a different ordering key.
    #[must_use]
    pub fn at_key(&self, ordering_key: OrderingKey) -> Self {
        Self { ordering_key, ..self.clone() }
    }
}

/// Serialized form of [`StateEvent`]; the typed content is rebuilt on load.
#[derive(Serialize, Deserialize)]
struct StoredEvent {
    raw: RawEvent,
    ordering_key: OrderingKey,
    status: EventStatus,
}

impl From<StoredEvent> for StateEvent {
    fn from(stored: StoredEvent) -> Self {
        Self::with_status(stored.raw, stored.ordering_key, stored.status)
    }
}

impl From<StateEvent> for StoredEvent {
    fn from(event: StateEvent) -> Self {
        Self { raw: event.raw, ordering_key: event.ordering_key, status: event.status }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::NameContent;

    fn name_event() -> RawEvent {
        RawEvent::new(
            event_type::NAME,
            Some(String::new()),
            UserId::new("@alice:example.org"),
            EventId::new("$name"),
            1_000,
            json!({"name": "Demo"}),
        )
    }

    #[test]
    fn transaction_id_round_trips_through_unsigned() {
        let txn = TransactionId::new("t1");
        let raw = name_event().with_transaction_id(&txn);
        assert_eq!(raw.transaction_id(), Some(txn));
    }

    #[test]
    fn parse_from_json() {
        let raw = RawEvent::from_json(
            r#"{"type":"m.room.topic","state_key":"","sender":"@a:b","event_id":"$t",
                "origin_server_ts":5,"content":{"topic":"hello"}}"#,
        )
        .unwrap();
        assert_eq!(raw.event_type, event_type::TOPIC);
        assert_eq!(raw.state_key.as_deref(), Some(""));
    }

    #[test]
    fn confirmation_keeps_ordering_key() {
        let echo =
            StateEvent::with_status(name_event(), OrderingKey::new(77), EventStatus::Sending);
        let sent = echo.confirmed(EventId::new("$server"));
        assert_eq!(sent.ordering_key(), OrderingKey::new(77));
        assert_eq!(sent.status(), EventStatus::Sent);
        assert_eq!(sent.event_id().as_str(), "$server");
    }

    #[test]
    fn stored_form_rebuilds_typed_content() {
        let event = StateEvent::new(name_event(), OrderingKey::new(3));
        let json = serde_json::to_string(&event).unwrap();
        let back: StateEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content(), &RoomContent::Name(NameContent { name: "Demo".into() }));
        assert_eq!(back, event);
    }
}
