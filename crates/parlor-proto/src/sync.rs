//! Sync and pagination payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{RawEvent, RoomId, UserId};

/// Room-scoped event without id or sender (ephemeral and account data).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicEvent {
    /// Event type; the key in its store.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Payload.
    #[serde(default)]
    pub content: Value,
}

impl BasicEvent {
    /// Build an event.
    pub fn new(event_type: impl Into<String>, content: Value) -> Self {
        Self { event_type: event_type.into(), content }
    }
}

/// Membership hints computed by the server.
///
/// Counts are authoritative; they are never derived from member state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomSummary {
    /// Members used to name unnamed rooms.
    #[serde(default, rename = "m.heroes", skip_serializing_if = "Option::is_none")]
    pub heroes: Option<Vec<UserId>>,
    /// Joined member count.
    #[serde(default, rename = "m.joined_member_count", skip_serializing_if = "Option::is_none")]
    pub joined_member_count: Option<u64>,
    /// Invited member count.
    #[serde(default, rename = "m.invited_member_count", skip_serializing_if = "Option::is_none")]
    pub invited_member_count: Option<u64>,
}

impl RoomSummary {
    /// Overlay the fields present in `update`; absent fields keep their value.
    pub fn merge(&mut self, update: Self) {
        if update.heroes.is_some() {
            self.heroes = update.heroes;
        }
        if update.joined_member_count.is_some() {
            self.joined_member_count = update.joined_member_count;
        }
        if update.invited_member_count.is_some() {
            self.invited_member_count = update.invited_member_count;
        }
    }
}

/// Live timeline slice of a sync response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Timeline {
    /// Events, oldest first.
    #[serde(default)]
    pub events: Vec<RawEvent>,
    /// Whether events were skipped before this slice.
    #[serde(default)]
    pub limited: bool,
    /// Token to paginate backwards from the start of this slice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_batch: Option<String>,
}

/// Unread counters computed by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnreadNotifications {
    /// Notifying events since the read marker.
    #[serde(default)]
    pub notification_count: u64,
    /// Highlighting events since the read marker.
    #[serde(default)]
    pub highlight_count: u64,
}

/// Everything a sync response carries for one room.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RoomUpdate {
    /// Membership hints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RoomSummary>,
    /// State delta preceding the timeline.
    #[serde(default)]
    pub state: Vec<RawEvent>,
    /// Live timeline.
    #[serde(default)]
    pub timeline: Timeline,
    /// Ephemeral events (typing, receipts).
    #[serde(default)]
    pub ephemeral: Vec<BasicEvent>,
    /// Room account data.
    #[serde(default)]
    pub account_data: Vec<BasicEvent>,
    /// Unread counters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_notifications: Option<UnreadNotifications>,
}

/// A sync response, keyed by room.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    /// Per-room updates.
    #[serde(default)]
    pub rooms: BTreeMap<RoomId, RoomUpdate>,
    /// Global account data (`m.direct`, push rules, emote sources).
    #[serde(default)]
    pub account_data: Vec<BasicEvent>,
    /// Token for the next sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_batch: Option<String>,
}

/// Response of a backwards pagination request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaginationChunk {
    /// Timeline events, newest first.
    #[serde(default)]
    pub chunk: Vec<RawEvent>,
    /// State needed to interpret `chunk`.
    #[serde(default)]
    pub state: Vec<RawEvent>,
    /// Token the request started from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Continuation token; absent when there is no older history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl PaginationChunk {
    /// Whether the response ends backwards history.
    pub fn is_terminal(&self) -> bool {
        self.chunk.is_empty() || self.end.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_merge_keeps_absent_fields() {
        let mut summary = RoomSummary {
            heroes: Some(vec![UserId::new("@bob:x")]),
            joined_member_count: Some(2),
            invited_member_count: Some(0),
        };
        summary.merge(RoomSummary { joined_member_count: Some(3), ..RoomSummary::default() });
        assert_eq!(summary.joined_member_count, Some(3));
        assert_eq!(summary.heroes, Some(vec![UserId::new("@bob:x")]));
    }

    #[test]
    fn empty_chunk_is_terminal() {
        let chunk = PaginationChunk { end: Some("t2".into()), ..PaginationChunk::default() };
        assert!(chunk.is_terminal());
    }
}
