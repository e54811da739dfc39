//! Derived room view.
//!
//! Pure functions over the resident state. Nothing is cached; every accessor
//! recomputes from the [`StateStore`] so a read after an admission always
//! sees the new state.

use parlor_proto::{
    GuestAccess, HistoryVisibility, JoinRule, Membership, RoomContent, RoomSummary, StateEvent,
    UserId, event_type, ids,
};

use crate::{
    membership::{self, MembershipSnapshot},
    power_levels::Permissions,
    state_store::StateStore,
};

/// Shortest canonical alias (including sigil and server) used as a name.
const MIN_ALIAS_LEN: usize = 4;

/// Read-only view over one room's state.
#[derive(Debug, Clone, Copy)]
pub struct RoomView<'a> {
    store: &'a StateStore,
    own_user: &'a UserId,
    summary: &'a RoomSummary,
}

impl<'a> RoomView<'a> {
    /// View `store` from the perspective of `own_user`.
    pub fn new(store: &'a StateStore, own_user: &'a UserId, summary: &'a RoomSummary) -> Self {
        Self { store, own_user, summary }
    }

    /// Underlying store.
    pub fn store(&self) -> &'a StateStore {
        self.store
    }

    /// Human-readable room name.
    ///
    /// In order: the room name if non-empty; the canonical alias localpart
    /// when the alias is long enough; the heroes' display names; the inviter
    /// if we are invited; `empty_label`.
    pub fn display_name(&self, empty_label: &str) -> String {
        if let Some(name) = self.name().filter(|name| !name.is_empty()) {
            return name.to_owned();
        }

        if let Some(alias) = self.canonical_alias().filter(|alias| alias.len() >= MIN_ALIAS_LEN) {
            return ids::localpart(alias).to_owned();
        }

        let heroes = self.heroes();
        if !heroes.is_empty() {
            return heroes
                .iter()
                .map(|user| membership::member_display_name(self.store, user))
                .collect::<Vec<_>>()
                .join(", ");
        }

        if let Some(own) = membership::member_event(self.store, self.own_user) {
            if membership::membership_of(self.store, self.own_user) == Some(Membership::Invite) {
                return membership::member_display_name(self.store, own.sender());
            }
        }

        empty_label.to_owned()
    }

    /// Members used to name an unnamed room, excluding ourselves.
    ///
    /// Summary heroes when the server sent them, else joined and invited
    /// members from state.
    pub fn heroes(&self) -> Vec<UserId> {
        let candidates = self.summary.heroes.clone().unwrap_or_else(|| {
            let mut members = membership::members_with(self.store, Membership::Join);
            members.extend(membership::members_with(self.store, Membership::Invite));
            members
        });
        candidates.into_iter().filter(|user| user != self.own_user).collect()
    }

    /// `m.room.name`, possibly empty.
    pub fn name(&self) -> Option<&'a str> {
        match self.content(event_type::NAME)? {
            RoomContent::Name(content) => Some(content.name.as_str()),
            _ => None,
        }
    }

    /// `m.room.topic`.
    pub fn topic(&self) -> Option<&'a str> {
        match self.content(event_type::TOPIC)? {
            RoomContent::Topic(content) => Some(content.topic.as_str()),
            _ => None,
        }
    }

    /// `m.room.avatar` URL.
    pub fn avatar_url(&self) -> Option<&'a str> {
        match self.content(event_type::AVATAR)? {
            RoomContent::Avatar(content) => content.url.as_deref(),
            _ => None,
        }
    }

    /// `m.room.canonical_alias` alias.
    pub fn canonical_alias(&self) -> Option<&'a str> {
        match self.content(event_type::CANONICAL_ALIAS)? {
            RoomContent::CanonicalAlias(content) => content.alias.as_deref(),
            _ => None,
        }
    }

    /// Active encryption algorithm, if the room is encrypted.
    pub fn encryption_algorithm(&self) -> Option<&'a str> {
        match self.content(event_type::ENCRYPTION)? {
            RoomContent::Encryption(content) => Some(content.algorithm.as_str()),
            _ => None,
        }
    }

    /// Whether an encryption algorithm is active.
    pub fn is_encrypted(&self) -> bool {
        self.encryption_algorithm().is_some()
    }

    /// Join rule.
    pub fn join_rule(&self) -> Option<JoinRule> {
        match self.content(event_type::JOIN_RULES)? {
            RoomContent::JoinRules(content) => Some(content.join_rule),
            _ => None,
        }
    }

    /// Guest access.
    pub fn guest_access(&self) -> Option<GuestAccess> {
        match self.content(event_type::GUEST_ACCESS)? {
            RoomContent::GuestAccess(content) => Some(content.guest_access),
            _ => None,
        }
    }

    /// History visibility.
    pub fn history_visibility(&self) -> Option<HistoryVisibility> {
        match self.content(event_type::HISTORY_VISIBILITY)? {
            RoomContent::HistoryVisibility(content) => Some(content.history_visibility),
            _ => None,
        }
    }

    /// Most recent event for a room preview.
    ///
    /// Among `preview_types`, the entry with the greatest ordering key wins,
    /// a non-encrypted entry winning an exact tie. Only if no preview type
    /// is resident at all does it fall back to the entry with the greatest
    /// origin timestamp across every type.
    pub fn last_event<S: AsRef<str>>(&self, preview_types: &[S]) -> Option<&'a StateEvent> {
        let preview = preview_types
            .iter()
            .filter_map(|ty| self.store.get(ty.as_ref(), ""))
            .max_by_key(|event| (event.ordering_key(), !event.is_encrypted()));

        preview.or_else(|| self.store.iter().max_by_key(|event| event.origin_server_ts()))
    }

    /// Permission evaluator bound to this room's power levels.
    pub fn permissions(&self) -> Permissions<'a> {
        Permissions::from_store(self.store)
    }

    /// Whether we may send `event_type`.
    pub fn can_send(&self, event_type: &str) -> bool {
        self.permissions().can_send(self.own_user, event_type)
    }

    /// Whether we may set state of `event_type`.
    pub fn can_send_state(&self, event_type: &str) -> bool {
        self.permissions().can_send_state(self.own_user, event_type)
    }

    /// Our membership.
    pub fn own_membership(&self) -> Option<Membership> {
        membership::membership_of(self.store, self.own_user)
    }

    /// Membership snapshot with summary count hints.
    pub fn membership_snapshot(&self) -> MembershipSnapshot {
        MembershipSnapshot::capture(self.store, self.own_user, self.summary)
    }

    fn content(&self, event_type: &str) -> Option<&'a RoomContent> {
        self.store.get(event_type, "").map(StateEvent::content)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parlor_proto::{EventId, OrderingKey, RawEvent, RoomId};
    use proptest::prelude::*;
    use serde_json::{Value, json};

    use super::*;

    const EMPTY: &str = "Empty chat";

    fn me() -> UserId {
        UserId::new("@me:example.org")
    }

    fn state(
        ty: &str,
        state_key: Option<&str>,
        sender: &str,
        content: Value,
        key: i64,
    ) -> StateEvent {
        StateEvent::new(
            RawEvent::new(
                ty,
                state_key.map(str::to_owned),
                UserId::new(sender),
                EventId::new(format!("${ty}{key}")),
                u64::try_from(key.unsigned_abs()).unwrap(),
                content,
            ),
            OrderingKey::new(key),
        )
    }

    /// Room-wide state sent by us.
    fn room_state(ty: &str, content: Value, key: i64) -> StateEvent {
        state(ty, Some(""), "@me:example.org", content, key)
    }

    fn joined_room() -> StateStore {
        let mut store = StateStore::new(RoomId::new("!r:example.org"));
        let me = "@me:example.org";
        let joined = json!({"membership": "join"});
        store.apply(state(event_type::MEMBER, Some(me), me, joined, 1), None);
        store
    }

    #[test]
    fn lonely_room_uses_empty_label_then_name() {
        let mut store = joined_room();
        let summary = RoomSummary::default();
        let me = me();
        assert_eq!(RoomView::new(&store, &me, &summary).display_name(EMPTY), EMPTY);

        store.apply(room_state(event_type::NAME, json!({"name": "Demo"}), 5), None);
        assert_eq!(RoomView::new(&store, &me, &summary).display_name(EMPTY), "Demo");
    }

    #[test]
    fn empty_name_falls_through_to_alias() {
        let mut store = joined_room();
        store.apply(room_state(event_type::NAME, json!({"name": ""}), 2), None);
        let alias = json!({"alias": "#lobby:example.org"});
        store.apply(room_state(event_type::CANONICAL_ALIAS, alias, 3), None);
        let me = me();
        let summary = RoomSummary::default();
        assert_eq!(RoomView::new(&store, &me, &summary).display_name(EMPTY), "lobby");
    }

    #[test]
    fn short_alias_is_ignored() {
        let mut store = joined_room();
        store.apply(room_state(event_type::CANONICAL_ALIAS, json!({"alias": "#a"}), 3), None);
        let me = me();
        let summary = RoomSummary::default();
        assert_eq!(RoomView::new(&store, &me, &summary).display_name(EMPTY), EMPTY);
    }

    #[test]
    fn alias_length_counts_sigil_and_server() {
        let mut store = joined_room();
        store.apply(room_state(event_type::CANONICAL_ALIAS, json!({"alias": "#a:x"}), 3), None);
        let me = me();
        let summary = RoomSummary::default();
        assert_eq!(RoomView::new(&store, &me, &summary).display_name(EMPTY), "a");
    }

    #[test]
    fn heroes_exclude_self() {
        let mut store = joined_room();
        store.apply(
            state(
                event_type::MEMBER,
                Some("@bob:example.org"),
                "@bob:example.org",
                json!({"membership": "join", "displayname": "Bob"}),
                4,
            ),
            None,
        );
        let me = me();
        let summary = RoomSummary {
            heroes: Some(vec![me.clone(), UserId::new("@bob:example.org"), UserId::new("@eve:x")]),
            ..RoomSummary::default()
        };
        assert_eq!(RoomView::new(&store, &me, &summary).display_name(EMPTY), "Bob, eve");
    }

    #[test]
    fn invite_names_the_inviter() {
        let mut store = StateStore::new(RoomId::new("!r:example.org"));
        store.apply(
            state(
                event_type::MEMBER,
                Some("@me:example.org"),
                "@bob:example.org",
                json!({"membership": "invite"}),
                1,
            ),
            None,
        );
        let me = me();
        let summary = RoomSummary { heroes: Some(vec![]), ..RoomSummary::default() };
        assert_eq!(RoomView::new(&store, &me, &summary).display_name(EMPTY), "bob");
    }

    #[test]
    fn last_event_prefers_plaintext_on_tie() {
        let mut store = joined_room();
        let sealed = json!({"algorithm": "a"});
        store.apply(state(event_type::ENCRYPTED, None, "@bob:x", sealed, 9), None);
        let text = json!({"msgtype": "m.text", "body": "hi"});
        store.apply(state(event_type::MESSAGE, None, "@bob:x", text, 9), None);
        let me = me();
        let summary = RoomSummary::default();
        let types = [event_type::MESSAGE, event_type::ENCRYPTED];
        let last = RoomView::new(&store, &me, &summary).last_event(&types).unwrap();
        assert_eq!(last.event_type(), event_type::MESSAGE);
    }

    #[test]
    fn last_event_falls_back_to_newest_timestamp() {
        let mut store = joined_room();
        store.apply(room_state(event_type::TOPIC, json!({"topic": "t"}), 7), None);
        let me = me();
        let summary = RoomSummary::default();
        let last = RoomView::new(&store, &me, &summary).last_event(&[event_type::MESSAGE]).unwrap();
        assert_eq!(last.event_type(), event_type::TOPIC);
    }

    #[test]
    fn typed_getters_read_state() {
        let mut store = joined_room();
        store.apply(room_state(event_type::TOPIC, json!({"topic": "Rust"}), 2), None);
        store.apply(room_state(event_type::JOIN_RULES, json!({"join_rule": "invite"}), 3), None);
        let megolm = json!({"algorithm": "m.megolm.v1.aes-sha2"});
        store.apply(room_state(event_type::ENCRYPTION, megolm, 4), None);
        let me = me();
        let summary = RoomSummary::default();
        let view = RoomView::new(&store, &me, &summary);
        assert_eq!(view.topic(), Some("Rust"));
        assert_eq!(view.join_rule(), Some(JoinRule::Invite));
        assert!(view.is_encrypted());
        assert_eq!(view.own_membership(), Some(Membership::Join));
        assert!(view.guest_access().is_none());
    }

    proptest! {
        #[test]
        fn newest_name_always_wins(
            names in prop::collection::vec(("[a-z]{1,8}", 1i64..10_000), 1..16)
        ) {
            let mut store = joined_room();
            for (name, key) in &names {
                store.apply(room_state(event_type::NAME, json!({"name": name}), *key), None);
            }
            // First offered among equal keys stays resident.
            let max = names.iter().map(|(_, key)| *key).max().unwrap();
            let expected = &names.iter().find(|(_, key)| *key == max).unwrap().0;

            let me = me();
            let summary = RoomSummary::default();
            prop_assert_eq!(&RoomView::new(&store, &me, &summary).display_name(EMPTY), expected);
        }
    }
}
