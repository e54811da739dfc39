//! Raw event builders for tests and scenarios.
//!
//! Event ids come from a process-wide counter, so every built event is
//! distinct.

use std::sync::atomic::{AtomicU64, Ordering};

use parlor_proto::{EventId, RawEvent, RoomUpdate, UserId, event_type};
use serde_json::{Value, json};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> EventId {
    EventId::new(format!("$fx{}", NEXT_ID.fetch_add(1, Ordering::Relaxed)))
}

/// State event with a fresh id.
pub fn state(event_type: &str, state_key: &str, sender: &UserId, content: Value) -> RawEvent {
    RawEvent::new(event_type, Some(state_key.to_owned()), sender.clone(), next_id(), 0, content)
}

/// `m.room.member` for `user` with `membership`.
pub fn member(user: &UserId, membership: &str) -> RawEvent {
    state(event_type::MEMBER, user.as_str(), user, json!({"membership": membership}))
}

/// `m.room.name`.
pub fn name(sender: &UserId, name: &str) -> RawEvent {
    state(event_type::NAME, "", sender, json!({"name": name}))
}

/// `m.room.power_levels` with `users` levels.
pub fn power_levels(sender: &UserId, users: &[(&UserId, i64)], extra: Value) -> RawEvent {
    let mut content = json!({
        "users": users
            .iter()
            .map(|(user, level)| (user.to_string(), json!(level)))
            .collect::<serde_json::Map<_, _>>(),
    });
    if let (Some(content), Value::Object(extra)) = (content.as_object_mut(), extra) {
        content.extend(extra);
    }
    state(event_type::POWER_LEVELS, "", sender, content)
}

/// Plain text `m.room.message` at `origin_server_ts`.
pub fn message(sender: &UserId, body: &str, origin_server_ts: u64) -> RawEvent {
    RawEvent::new(
        event_type::MESSAGE,
        None,
        sender.clone(),
        next_id(),
        origin_server_ts,
        json!({"msgtype": "m.text", "body": body}),
    )
}

/// Sync slice carrying only `state`.
pub fn state_update(state: Vec<RawEvent>) -> RoomUpdate {
    RoomUpdate { state, ..RoomUpdate::default() }
}
