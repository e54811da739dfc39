//! Emote pack aggregation.
//!
//! Packs come from three sources, merged in fixed precedence:
//!
//! 1. the user's own pack (`im.ponies.user_emotes` account data)
//! 2. packs in other rooms referenced by `im.ponies.emote_rooms`
//! 3. this room's `im.ponies.room_emotes` state
//!
//! Emotes are deduplicated by media URL across all sources combined; the
//! first occurrence in precedence order wins. Packs left empty by
//! deduplication are dropped.

use std::collections::HashSet;

use parlor_proto::{EmotePackContent, RoomContent, RoomId, event_type, ids};
use serde_json::Value;

use crate::state_store::StateStore;

/// Where a pack came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmoteSource {
    /// User account data.
    User,
    /// Another room, referenced from account data.
    Referenced {
        /// Room holding the pack.
        room_id: RoomId,
        /// State key of the pack.
        state_key: String,
    },
    /// This room's own state.
    Room {
        /// State key of the pack.
        state_key: String,
    },
}

/// One emote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emote {
    /// Shortcode without colons.
    pub shortcode: String,
    /// Media URL.
    pub url: String,
}

/// A pack after aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmotePack {
    /// Normalized pack name.
    pub slug: String,
    /// Display name as configured, or the fallback the slug was built from.
    pub display_name: String,
    /// Origin of the pack.
    pub source: EmoteSource,
    /// Emotes, in shortcode order.
    pub emotes: Vec<Emote>,
}

/// A pack from another room, resolved by the caller.
#[derive(Debug, Clone)]
pub struct ReferencedPack {
    /// Room holding the pack.
    pub room_id: RoomId,
    /// State key of the pack.
    pub state_key: String,
    /// Pack content.
    pub content: EmotePackContent,
}

/// Normalize a pack name: lowercase, whitespace to `_`, only word
/// characters kept.
pub fn slugify(name: &str) -> String {
    name.chars()
        .flat_map(char::to_lowercase)
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_alphanumeric() || c == '_' {
                Some(c)
            } else {
                None
            }
        })
        .collect()
}

/// Rooms and state keys listed in `im.ponies.emote_rooms` account data.
pub fn referenced_rooms(emote_rooms: &Value) -> Vec<(RoomId, String)> {
    let Some(rooms) = emote_rooms.get("rooms").and_then(Value::as_object) else {
        return Vec::new();
    };
    rooms
        .iter()
        .flat_map(|(room_id, packs)| {
            packs
                .as_object()
                .into_iter()
                .flat_map(|packs| packs.keys())
                .map(move |state_key| (RoomId::new(room_id.as_str()), state_key.clone()))
        })
        .collect()
}

/// Decoded room emote packs in `store`, sorted by state key.
pub fn room_packs(store: &StateStore) -> Vec<(String, EmotePackContent)> {
    let mut packs: Vec<_> = store
        .of_type(event_type::ROOM_EMOTES)
        .filter_map(|event| match event.content() {
            RoomContent::EmotePack(pack) => {
                Some((event.state_key().unwrap_or_default().to_owned(), pack.clone()))
            },
            _ => None,
        })
        .collect();
    packs.sort_by(|a, b| a.0.cmp(&b.0));
    packs
}

/// Merge all sources into the final pack list.
pub fn aggregate(
    user_pack: Option<&EmotePackContent>,
    referenced: &[ReferencedPack],
    room: &StateStore,
) -> Vec<EmotePack> {
    let mut seen_urls = HashSet::new();
    let mut packs = Vec::new();

    if let Some(content) = user_pack {
        packs.extend(build(content, "user", EmoteSource::User, &mut seen_urls));
    }

    for pack in referenced {
        let source = EmoteSource::Referenced {
            room_id: pack.room_id.clone(),
            state_key: pack.state_key.clone(),
        };
        let fallback = fallback_name(&pack.state_key, pack.room_id.as_str());
        packs.extend(build(&pack.content, &fallback, source, &mut seen_urls));
    }

    for (state_key, content) in room_packs(room) {
        let fallback = fallback_name(&state_key, room.room_id().as_str());
        let source = EmoteSource::Room { state_key };
        packs.extend(build(&content, &fallback, source, &mut seen_urls));
    }

    packs
}

fn fallback_name(state_key: &str, room_id: &str) -> String {
    if state_key.is_empty() {
        ids::localpart(room_id).to_owned()
    } else {
        state_key.to_owned()
    }
}

fn build(
    content: &EmotePackContent,
    fallback: &str,
    source: EmoteSource,
    seen_urls: &mut HashSet<String>,
) -> Option<EmotePack> {
    let emotes: Vec<_> = content
        .entries()
        .filter(|(_, url)| seen_urls.insert((*url).to_owned()))
        .map(|(shortcode, url)| Emote { shortcode: shortcode.to_owned(), url: url.to_owned() })
        .collect();
    if emotes.is_empty() {
        return None;
    }

    let display_name = content
        .pack
        .as_ref()
        .and_then(|info| info.display_name.clone())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| fallback.to_owned());

    Some(EmotePack { slug: slugify(&display_name), display_name, source, emotes })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parlor_proto::{EventId, OrderingKey, RawEvent, StateEvent, UserId};
    use serde_json::json;

    use super::*;

    fn pack(value: Value) -> EmotePackContent {
        serde_json::from_value(value).unwrap()
    }

    fn room_with_pack(value: Value) -> StateStore {
        let mut store = StateStore::new(RoomId::new("!here:example.org"));
        store.apply(
            StateEvent::new(
                RawEvent::new(
                    event_type::ROOM_EMOTES,
                    Some(String::new()),
                    UserId::new("@a:x"),
                    EventId::new("$p"),
                    0,
                    value,
                ),
                OrderingKey::new(1),
            ),
            None,
        );
        store
    }

    #[test]
    fn slug_is_lowercase_word_characters() {
        assert_eq!(slugify("My Cool Pack!"), "my_cool_pack");
        assert_eq!(slugify("ünïcode\tok-ish"), "ünïcode_okish");
    }

    #[test]
    fn precedence_and_url_dedup() {
        let user = pack(json!({"images": {"wave": {"url": "mxc://x/wave"}}}));
        let referenced = [ReferencedPack {
            room_id: RoomId::new("!far:x"),
            state_key: "cats".into(),
            content: pack(json!({
                "images": {"hi": {"url": "mxc://x/wave"}, "cat": {"url": "mxc://x/cat"}},
                "pack": {"display_name": "Cat Pics"}
            })),
        }];
        let room =
            room_with_pack(json!({"short": {":cat2:": "mxc://x/cat", ":dog:": "mxc://x/dog"}}));

        let packs = aggregate(Some(&user), &referenced, &room);
        assert_eq!(packs.len(), 3);
        assert_eq!(packs[0].source, EmoteSource::User);
        assert_eq!(packs[1].slug, "cat_pics");
        let cat = Emote { shortcode: "cat".into(), url: "mxc://x/cat".into() };
        assert_eq!(packs[1].emotes, vec![cat]);
        assert_eq!(packs[2].slug, "here");
        let dog = Emote { shortcode: "dog".into(), url: "mxc://x/dog".into() };
        assert_eq!(packs[2].emotes, vec![dog]);
    }

    #[test]
    fn fully_duplicated_pack_is_dropped() {
        let user = pack(json!({"images": {"wave": {"url": "mxc://x/wave"}}}));
        let room = room_with_pack(json!({"images": {"w": {"url": "mxc://x/wave"}}}));
        let packs = aggregate(Some(&user), &[], &room);
        assert_eq!(packs.len(), 1);
    }

    #[test]
    fn referenced_rooms_are_listed() {
        let data = json!({"rooms": {"!a:x": {"": {}, "extra": {}}, "!b:x": {}}});
        let rooms = referenced_rooms(&data);
        assert_eq!(rooms, vec![
            (RoomId::new("!a:x"), String::new()),
            (RoomId::new("!a:x"), "extra".to_owned()),
        ]);
        assert!(referenced_rooms(&json!({})).is_empty());
    }
}
