//! Persisted room snapshot.
//!
//! Everything needed to resume a room without a full resync: resident state
//! with ordering keys and send status, the ordering counters, the pager
//! position, room account data and the summary hints. Encoded as CBOR.
//!
//! Pending sends are not part of the snapshot. Their echoes are restored as
//! resident state but no attempt is resumed.

use parlor_core::{KeyValueStore, OrderingCheckpoint};
use parlor_proto::{RoomId, RoomSummary, StateEvent};
use serde::{Deserialize, Serialize};

use crate::{error::ClientError, pager::PagerCheckpoint};

/// Serializable room state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    /// Room the snapshot belongs to.
    pub room_id: RoomId,
    /// Resident state events.
    pub events: Vec<StateEvent>,
    /// Ordering counters.
    pub ordering: OrderingCheckpoint,
    /// Pager position.
    pub pager: PagerCheckpoint,
    /// Room account data.
    pub account_data: KeyValueStore,
    /// Summary hints.
    pub summary: RoomSummary,
}

impl RoomSnapshot {
    /// Encode as CBOR.
    pub fn encode(&self) -> Result<Vec<u8>, ClientError> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes)
            .map_err(|e| ClientError::Snapshot { reason: format!("CBOR encode failed: {e}") })?;
        Ok(bytes)
    }

    /// Decode from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self, ClientError> {
        ciborium::de::from_reader(bytes)
            .map_err(|e| ClientError::Snapshot { reason: format!("CBOR decode failed: {e}") })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parlor_proto::{EventId, EventStatus, OrderingKey, RawEvent, RoomContent, UserId};
    use serde_json::json;

    use super::*;

    #[test]
    fn snapshot_survives_cbor() {
        let raw = RawEvent::new(
            "m.room.name",
            Some(String::new()),
            UserId::new("@a:x"),
            EventId::new("$n"),
            42,
            json!({"name": "Demo"}),
        );
        let mut account_data = KeyValueStore::new();
        account_data.put("m.tag", json!({"tags": {"u.work": {}}}));
        let snapshot = RoomSnapshot {
            room_id: RoomId::new("!r:x"),
            events: vec![StateEvent::with_status(raw, OrderingKey::new(-3), EventStatus::Sent)],
            ordering: OrderingCheckpoint { last_forward: 10, last_backward: -3 },
            pager: PagerCheckpoint { token: Some("t".into()), exhausted: false },
            account_data,
            summary: RoomSummary { joined_member_count: Some(2), ..RoomSummary::default() },
        };

        let decoded = RoomSnapshot::decode(&snapshot.encode().unwrap()).unwrap();
        assert_eq!(decoded, snapshot);
        assert!(matches!(decoded.events[0].content(), RoomContent::Name(n) if n.name == "Demo"));
    }

    #[test]
    fn garbage_is_a_snapshot_error() {
        let err = RoomSnapshot::decode(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(err.is_fatal());
    }
}
