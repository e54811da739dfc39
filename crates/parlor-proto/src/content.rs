//! Typed content payloads.
//!
//! [`RoomContent`] is a closed union over the event types the engine reads.
//! Each variant holds a serde-decoded payload; everything else, including
//! payloads that fail to decode for a known type, is kept as
//! [`RoomContent::Opaque`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{EventId, UserId, event_type as types};

/// Decoded content of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomContent {
    /// `m.room.create`
    Create(CreateContent),
    /// `m.room.name`
    Name(NameContent),
    /// `m.room.topic`
    Topic(TopicContent),
    /// `m.room.avatar`
    Avatar(AvatarContent),
    /// `m.room.canonical_alias`
    CanonicalAlias(CanonicalAliasContent),
    /// `m.room.member`
    Member(MemberContent),
    /// `m.room.power_levels`
    PowerLevels(PowerLevelsContent),
    /// `m.room.join_rules`
    JoinRules(JoinRulesContent),
    /// `m.room.guest_access`
    GuestAccess(GuestAccessContent),
    /// `m.room.history_visibility`
    HistoryVisibility(HistoryVisibilityContent),
    /// `m.room.encryption`
    Encryption(EncryptionContent),
    /// `m.room.message` and `m.sticker`
    Message(MessageContent),
    /// `m.room.encrypted`
    Encrypted(EncryptedContent),
    /// `m.reaction`
    Reaction(ReactionContent),
    /// `m.room.redaction`
    Redaction(RedactionContent),
    /// `im.ponies.room_emotes` / `im.ponies.user_emotes`
    EmotePack(EmotePackContent),
    /// Anything the engine does not interpret.
    Opaque(Value),
}

impl RoomContent {
    /// Decode a payload for the given event type. Never fails.
    pub fn decode(event_type: &str, content: &Value) -> Self {
        match event_type {
            types::CREATE => typed(content, Self::Create),
            types::NAME => typed(content, Self::Name),
            types::TOPIC => typed(content, Self::Topic),
            types::AVATAR => typed(content, Self::Avatar),
            types::CANONICAL_ALIAS => typed(content, Self::CanonicalAlias),
            types::MEMBER => typed(content, Self::Member),
            types::POWER_LEVELS => typed(content, Self::PowerLevels),
            types::JOIN_RULES => typed(content, Self::JoinRules),
            types::GUEST_ACCESS => typed(content, Self::GuestAccess),
            types::HISTORY_VISIBILITY => typed(content, Self::HistoryVisibility),
            types::ENCRYPTION => typed(content, Self::Encryption),
            types::MESSAGE | types::STICKER => typed(content, Self::Message),
            types::ENCRYPTED => typed(content, Self::Encrypted),
            types::REACTION => typed(content, Self::Reaction),
            types::REDACTION => typed(content, Self::Redaction),
            types::ROOM_EMOTES | types::USER_EMOTES => typed(content, Self::EmotePack),
            _ => Self::Opaque(content.clone()),
        }
    }
}

fn typed<T: DeserializeOwned>(content: &Value, wrap: fn(T) -> RoomContent) -> RoomContent {
    serde_json::from_value(content.clone())
        .map_or_else(|_| RoomContent::Opaque(content.clone()), wrap)
}

/// `m.room.create` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CreateContent {
    /// Room creator (older room versions only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<UserId>,
    /// Room version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_version: Option<String>,
    /// Room type, e.g. `m.space`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
}

/// `m.room.name` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NameContent {
    /// Human-readable room name.
    #[serde(default)]
    pub name: String,
}

/// `m.room.topic` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopicContent {
    /// Room topic.
    #[serde(default)]
    pub topic: String,
}

/// `m.room.avatar` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AvatarContent {
    /// Media URL of the avatar, absent when removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// `m.room.canonical_alias` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanonicalAliasContent {
    /// The canonical alias.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Alternative aliases.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt_aliases: Vec<String>,
}

/// Membership state of a user in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    /// Joined.
    Join,
    /// Invited, not yet joined.
    Invite,
    /// Left or kicked.
    Leave,
    /// Banned.
    Ban,
    /// Asked to join.
    Knock,
}

/// `m.room.member` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberContent {
    /// Membership state.
    pub membership: Membership,
    /// Per-room display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayname: Option<String>,
    /// Per-room avatar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Set on invites that create a direct chat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_direct: Option<bool>,
}

/// `m.room.power_levels` payload.
///
/// Thresholds are optional; a missing threshold means the action is not
/// restricted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PowerLevelsContent {
    /// Explicit per-user levels.
    #[serde(default)]
    pub users: BTreeMap<UserId, i64>,
    /// Level of users absent from `users`.
    #[serde(default)]
    pub users_default: i64,
    /// Per-event-type thresholds.
    #[serde(default)]
    pub events: BTreeMap<String, i64>,
    /// Threshold for message-like events without an override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events_default: Option<i64>,
    /// Threshold for state events without an override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_default: Option<i64>,
    /// Threshold to ban.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ban: Option<i64>,
    /// Threshold to kick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kick: Option<i64>,
    /// Threshold to invite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invite: Option<i64>,
    /// Threshold to redact other users' events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redact: Option<i64>,
    /// Notification thresholds, e.g. `room` for `@room` pings.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub notifications: BTreeMap<String, i64>,
}

/// Join rule of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinRule {
    /// Anyone may join.
    Public,
    /// Invite only.
    Invite,
    /// Users may knock.
    Knock,
    /// Restricted to members of other rooms.
    Restricted,
    /// Reserved.
    Private,
}

/// `m.room.join_rules` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRulesContent {
    /// The join rule.
    pub join_rule: JoinRule,
}

/// Guest access setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuestAccess {
    /// Guests may join.
    CanJoin,
    /// Guests may not join.
    Forbidden,
}

/// `m.room.guest_access` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestAccessContent {
    /// The guest access setting.
    pub guest_access: GuestAccess,
}

/// History visibility setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryVisibility {
    /// Visible from the point of invite.
    Invited,
    /// Visible from the point of join.
    Joined,
    /// Visible to members, including history before joining.
    Shared,
    /// Visible to anyone.
    WorldReadable,
}

/// `m.room.history_visibility` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryVisibilityContent {
    /// The visibility setting.
    pub history_visibility: HistoryVisibility,
}

/// `m.room.encryption` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionContent {
    /// Encryption algorithm identifier.
    pub algorithm: String,
    /// Session rotation period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_period_ms: Option<u64>,
}

/// Reply target inside a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InReplyTo {
    /// Event being replied to.
    pub event_id: EventId,
}

/// `m.relates_to` block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Relation {
    /// Relation type (`m.replace`, `m.annotation`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rel_type: Option<String>,
    /// Target event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    /// Annotation key (reactions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Reply target.
    #[serde(default, rename = "m.in_reply_to", skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<InReplyTo>,
}

/// `m.room.message` / `m.sticker` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    /// Message type (`m.text`, `m.notice`, ...). Stickers omit it.
    #[serde(default)]
    pub msgtype: String,
    /// Plain-text body.
    #[serde(default)]
    pub body: String,
    /// Format of `formatted_body`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Rich-text body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_body: Option<String>,
    /// Relation to another event.
    #[serde(default, rename = "m.relates_to", skip_serializing_if = "Option::is_none")]
    pub relates_to: Option<Relation>,
    /// Replacement content carried by edits.
    #[serde(default, rename = "m.new_content", skip_serializing_if = "Option::is_none")]
    pub new_content: Option<Value>,
}

/// `m.room.encrypted` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedContent {
    /// Encryption algorithm identifier.
    pub algorithm: String,
    /// Ciphertext; a string or a per-device map depending on the algorithm.
    pub ciphertext: Value,
    /// Sender's curve key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_key: Option<String>,
    /// Megolm session id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Sending device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// `m.reaction` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionContent {
    /// Annotation relation to the reacted-to event.
    #[serde(rename = "m.relates_to")]
    pub relates_to: Relation,
}

/// `m.room.redaction` payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RedactionContent {
    /// Redacted event (newer room versions put it in content).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacts: Option<EventId>,
    /// Reason given by the redacting user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A single emote in a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmoteImage {
    /// Media URL; the deduplication key across packs.
    pub url: String,
    /// Alternative text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Pack metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmotePackInfo {
    /// Human-readable pack name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Pack avatar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Emote pack payload (`im.ponies.*`).
///
/// Accepts the current `images` map and the legacy `short` map of
/// shortcode to URL.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmotePackContent {
    /// Shortcode to image.
    #[serde(default)]
    pub images: BTreeMap<String, EmoteImage>,
    /// Legacy shortcode to URL map.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub short: BTreeMap<String, String>,
    /// Pack metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pack: Option<EmotePackInfo>,
}

impl EmotePackContent {
    /// All shortcode/URL pairs, current format first then legacy entries.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.images
            .iter()
            .map(|(code, image)| (code.as_str(), image.url.as_str()))
            .chain(self.short.iter().map(|(code, url)| (code.trim_matches(':'), url.as_str())))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_known_types() {
        let content = RoomContent::decode(types::NAME, &json!({"name": "Demo"}));
        assert_eq!(content, RoomContent::Name(NameContent { name: "Demo".to_string() }));
    }

    #[test]
    fn malformed_known_type_is_opaque() {
        let raw = json!({"membership": 42});
        assert_eq!(RoomContent::decode(types::MEMBER, &raw), RoomContent::Opaque(raw));
    }

    #[test]
    fn unknown_type_is_opaque() {
        let raw = json!({"anything": true});
        assert_eq!(RoomContent::decode("org.example.thing", &raw), RoomContent::Opaque(raw));
    }

    #[test]
    fn power_levels_defaults() {
        let RoomContent::PowerLevels(levels) =
            RoomContent::decode(types::POWER_LEVELS, &json!({"kick": 50}))
        else {
            panic!("expected power levels");
        };
        assert_eq!(levels.users_default, 0);
        assert_eq!(levels.kick, Some(50));
        assert_eq!(levels.ban, None);
    }

    #[test]
    fn reply_relation_decodes() {
        let content = RoomContent::decode(
            types::MESSAGE,
            &json!({
                "msgtype": "m.text",
                "body": "hi",
                "m.relates_to": {"m.in_reply_to": {"event_id": "$abc"}}
            }),
        );
        let RoomContent::Message(message) = content else { panic!("expected message") };
        let reply = message.relates_to.and_then(|r| r.in_reply_to);
        assert_eq!(reply.map(|r| r.event_id), Some(EventId::new("$abc")));
    }

    #[test]
    fn emote_pack_merges_legacy_entries() {
        let RoomContent::EmotePack(pack) = RoomContent::decode(
            types::ROOM_EMOTES,
            &json!({
                "images": {"wave": {"url": "mxc://a/wave"}},
                "short": {":nod:": "mxc://a/nod"}
            }),
        ) else {
            panic!("expected pack");
        };
        let entries: Vec<_> = pack.entries().collect();
        assert_eq!(entries, vec![("wave", "mxc://a/wave"), ("nod", "mxc://a/nod")]);
    }
}
