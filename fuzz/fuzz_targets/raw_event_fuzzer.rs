//! Fuzz target for untrusted event JSON
//!
//! Events arrive from the server as JSON the client does not control.
//!
//! # Strategy
//!
//! - Arbitrary bytes parsed as a raw event
//! - Parsed events admitted and rendered through the derived view
//!
//! # Invariants
//!
//! - Parsing NEVER panics, whatever the input
//! - Content decoding never fails; unknown shapes stay opaque
//! - Rendering a room holding the event NEVER panics

#![no_main]

use libfuzzer_sys::fuzz_target;
use parlor_core::{RoomView, StateStore};
use parlor_proto::{event_type, OrderingKey, RawEvent, RoomId, RoomSummary, StateEvent, UserId};

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(raw) = RawEvent::from_json(json) else {
        return;
    };

    let mut store = StateStore::new(RoomId::new("!fuzz:example.org"));
    let event = StateEvent::new(raw, OrderingKey::new(1));
    let _ = event.content();
    store.apply(event, None);

    let own_user = UserId::new("@me:example.org");
    let summary = RoomSummary::default();
    let view = RoomView::new(&store, &own_user, &summary);
    let _ = view.display_name("Empty chat");
    let _ = view.last_event(&[event_type::MESSAGE]);
    let _ = view.membership_snapshot();
    let _ = view.permissions().can_send(&own_user, event_type::NAME);
});
