//! Replace-on-write stores for room account data and ephemeral events.
//!
//! Both are keyed by event type; the latest received payload wins. There is
//! no ordering beyond arrival order.

use std::collections::BTreeMap;

use parlor_proto::{BasicEvent, EventId, UserId, event_type};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Latest payload per event type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyValueStore {
    entries: BTreeMap<String, Value>,
}

impl KeyValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a payload. Returns whether the stored value changed.
    pub fn put(&mut self, event_type: impl Into<String>, content: Value) -> bool {
        let event_type = event_type.into();
        if self.entries.get(&event_type) == Some(&content) {
            return false;
        }
        self.entries.insert(event_type, content);
        true
    }

    /// Store a batch. Returns the types whose value changed.
    pub fn put_all(&mut self, events: impl IntoIterator<Item = BasicEvent>) -> Vec<String> {
        events
            .into_iter()
            .filter_map(|event| {
                let ty = event.event_type.clone();
                self.put(event.event_type, event.content).then_some(ty)
            })
            .collect()
    }

    /// Payload for one type.
    pub fn get(&self, event_type: &str) -> Option<&Value> {
        self.entries.get(event_type)
    }

    /// All stored types.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of stored types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Users currently typing, from `m.typing`.
    pub fn typing_users(&self) -> Vec<UserId> {
        self.get(event_type::TYPING)
            .and_then(|content| content.get("user_ids"))
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).map(UserId::new).collect())
            .unwrap_or_default()
    }

    /// Read-marker position, from `m.fully_read`.
    pub fn fully_read(&self) -> Option<EventId> {
        self.get(event_type::FULLY_READ)
            .and_then(|content| content.get("event_id"))
            .and_then(Value::as_str)
            .map(EventId::new)
    }

    /// Manual unread flag, from `m.marked_unread`.
    pub fn marked_unread(&self) -> bool {
        self.get(event_type::MARKED_UNREAD)
            .and_then(|content| content.get("unread"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Room tags with their optional order, from `m.tag`.
    pub fn tags(&self) -> BTreeMap<String, Option<f64>> {
        self.get(event_type::TAG)
            .and_then(|content| content.get("tags"))
            .and_then(Value::as_object)
            .map(|tags| {
                tags.iter()
                    .map(|(tag, info)| {
                        (tag.clone(), info.get("order").and_then(Value::as_f64))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
