//! Fuzz target for the [`StateStore`] merge rule
//!
//! # Strategy
//!
//! - Candidates: arbitrary types (known state, message-like, unknown,
//!   verification) with and without state keys
//! - Keys: arbitrary ordering keys from both ranges, including ties
//!
//! # Invariants
//!
//! - A slot's resident ordering key never decreases
//! - An admitted candidate becomes the resident of its slot
//! - A refused candidate leaves the slot untouched
//! - Message-like events with a state key are never admitted
//! - NEVER panic on unexpected shapes

#![no_main]

use std::collections::HashMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parlor_core::StateStore;
use parlor_proto::{
    event_type, EventId, EventKind, OrderingKey, RawEvent, RoomId, StateEvent, UserId,
};
use serde_json::json;

const TYPES: [&str; 7] = [
    event_type::NAME,
    event_type::TOPIC,
    event_type::MEMBER,
    event_type::MESSAGE,
    event_type::REACTION,
    "org.example.custom",
    "m.key.verification.start",
];

#[derive(Debug, Clone, Arbitrary)]
struct Candidate {
    type_index: u8,
    state_key: Option<u8>,
    ordering_key: i64,
    body: String,
}

fuzz_target!(|candidates: Vec<Candidate>| {
    let mut store = StateStore::new(RoomId::new("!fuzz:example.org"));
    let mut residents: HashMap<(String, String), OrderingKey> = HashMap::new();

    for (i, candidate) in candidates.into_iter().enumerate() {
        let ty = TYPES[usize::from(candidate.type_index) % TYPES.len()];
        let state_key = candidate.state_key.map(|key| format!("@u{}:example.org", key % 4));
        let slot = (ty.to_owned(), state_key.clone().unwrap_or_default());
        let has_state_key = state_key.is_some();

        let raw = RawEvent::new(
            ty,
            state_key,
            UserId::new("@fuzz:example.org"),
            EventId::new(format!("$fuzz{i}")),
            0,
            json!({"body": candidate.body, "name": candidate.body}),
        );
        let key = OrderingKey::new(candidate.ordering_key);
        let before = store.get(&slot.0, &slot.1).map(StateEvent::ordering_key);
        let admitted = store.apply(StateEvent::new(raw, key), None);
        let after = store.get(&slot.0, &slot.1).map(StateEvent::ordering_key);

        if admitted {
            assert!(
                !(EventKind::classify(ty, has_state_key) == EventKind::MessageLike
                    && has_state_key),
                "message-like event with state key admitted"
            );
            assert_eq!(after, Some(key));
            if let Some(previous) = residents.insert(slot, key) {
                assert!(key > previous, "resident key went from {previous} to {key}");
            }
        } else {
            assert_eq!(before, after, "refused candidate changed its slot");
        }
    }

    assert_eq!(store.len(), residents.len());
});
