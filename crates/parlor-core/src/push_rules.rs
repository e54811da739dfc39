//! Room-level notification mode, read from `m.push_rules` account data.
//!
//! Only the per-room rules are interpreted. A room rule is one whose
//! `rule_id` equals the room id, under either the `override` or the `room`
//! kind.

use parlor_proto::RoomId;
use serde_json::Value;

/// Effective notification setting for a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationMode {
    /// Override rule suppresses all notifications.
    Mute,
    /// Room rule suppresses everything except mentions and keywords.
    MentionsAndKeywords,
    /// No suppressing rule.
    #[default]
    AllMessages,
}

/// Resolve the notification mode of `room_id` from push rules.
pub fn notification_mode(push_rules: Option<&Value>, room_id: &RoomId) -> NotificationMode {
    let Some(global) = push_rules.and_then(|rules| rules.get("global")) else {
        return NotificationMode::AllMessages;
    };

    if has_dont_notify(global.get("override"), room_id) {
        NotificationMode::Mute
    } else if has_dont_notify(global.get("room"), room_id) {
        NotificationMode::MentionsAndKeywords
    } else {
        NotificationMode::AllMessages
    }
}

fn has_dont_notify(rules: Option<&Value>, room_id: &RoomId) -> bool {
    rules.and_then(Value::as_array).is_some_and(|rules| {
        rules.iter().any(|rule| {
            rule.get("rule_id").and_then(Value::as_str) == Some(room_id.as_str())
                && rule.get("enabled").and_then(Value::as_bool).unwrap_or(true)
                && rule
                    .get("actions")
                    .and_then(Value::as_array)
                    .is_some_and(|actions| actions.iter().any(|a| a == "dont_notify"))
        })
    })
}
