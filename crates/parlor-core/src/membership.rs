//! Membership lookups and direct-chat linkage.
//!
//! Everything here is derived on demand from resident `m.room.member` state.
//! Member counts are not derived; they are hints from the sync summary.

use std::collections::BTreeMap;

use parlor_proto::{
    MemberContent, Membership, RoomContent, RoomId, RoomSummary, StateEvent, UserId, event_type,
    ids,
};
use serde_json::Value;

use crate::state_store::StateStore;

/// Decoded member event for `user_id`, if resident and well-formed.
pub fn member<'a>(store: &'a StateStore, user_id: &UserId) -> Option<&'a MemberContent> {
    member_event(store, user_id).and_then(member_content)
}

/// Raw member event for `user_id`.
pub fn member_event<'a>(store: &'a StateStore, user_id: &UserId) -> Option<&'a StateEvent> {
    store.get(event_type::MEMBER, user_id.as_str())
}

/// Membership of `user_id`, if known.
pub fn membership_of(store: &StateStore, user_id: &UserId) -> Option<Membership> {
    member(store, user_id).map(|content| content.membership)
}

/// Users with the given membership, sorted by id.
pub fn members_with(store: &StateStore, membership: Membership) -> Vec<UserId> {
    let mut users: Vec<_> = store
        .of_type(event_type::MEMBER)
        .filter(|event| member_content(event).is_some_and(|c| c.membership == membership))
        .filter_map(|event| event.state_key().map(UserId::new))
        .collect();
    users.sort();
    users
}

/// Display name of a member: non-empty `displayname`, else the localpart.
pub fn member_display_name(store: &StateStore, user_id: &UserId) -> String {
    member(store, user_id)
        .and_then(|content| content.displayname.as_deref())
        .filter(|name| !name.is_empty())
        .map_or_else(|| ids::localpart(user_id.as_str()).to_owned(), str::to_owned)
}

fn member_content(event: &StateEvent) -> Option<&MemberContent> {
    match event.content() {
        RoomContent::Member(content) => Some(content),
        _ => None,
    }
}

/// Point-in-time membership view of a room.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MembershipSnapshot {
    /// Users per membership state.
    pub by_membership: BTreeMap<Membership, Vec<UserId>>,
    /// Local user's membership.
    pub own: Option<Membership>,
    /// Joined count from the sync summary.
    pub joined_count: Option<u64>,
    /// Invited count from the sync summary.
    pub invited_count: Option<u64>,
}

impl MembershipSnapshot {
    /// Build the snapshot from resident state and summary hints.
    pub fn capture(store: &StateStore, own_user: &UserId, summary: &RoomSummary) -> Self {
        let mut by_membership: BTreeMap<Membership, Vec<UserId>> = BTreeMap::new();
        for event in store.of_type(event_type::MEMBER) {
            if let (Some(content), Some(user)) = (member_content(event), event.state_key()) {
                by_membership.entry(content.membership).or_default().push(UserId::new(user));
            }
        }
        for users in by_membership.values_mut() {
            users.sort();
        }

        Self {
            by_membership,
            own: membership_of(store, own_user),
            joined_count: summary.joined_member_count,
            invited_count: summary.invited_member_count,
        }
    }

    /// Users with the given membership.
    pub fn members(&self, membership: Membership) -> &[UserId] {
        self.by_membership.get(&membership).map_or(&[], Vec::as_slice)
    }
}

/// Direct-chat partner of a room.
///
/// Looks in global `m.direct` account data for a partner whose room list
/// contains `room_id`. Failing that, if the local user's member event carries
/// `is_direct`, the partner is that event's sender.
pub fn direct_chat_partner(
    store: &StateStore,
    own_user: &UserId,
    direct_account_data: Option<&Value>,
) -> Option<UserId> {
    let listed = direct_account_data.and_then(|data| partner_from_direct(data, store.room_id()));
    if listed.is_some() {
        return listed;
    }

    let own_event = member_event(store, own_user)?;
    let is_direct = member_content(own_event).and_then(|content| content.is_direct)?;
    (is_direct && own_event.sender() != own_user).then(|| own_event.sender().clone())
}

fn partner_from_direct(data: &Value, room_id: &RoomId) -> Option<UserId> {
    data.as_object()?.iter().find_map(|(user, rooms)| {
        rooms
            .as_array()?
            .iter()
            .any(|room| room.as_str() == Some(room_id.as_str()))
            .then(|| UserId::new(user.as_str()))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parlor_proto::{EventId, OrderingKey, RawEvent};
    use serde_json::json;

    use super::*;

    fn me() -> UserId {
        UserId::new("@me:example.org")
    }

    fn member_state(user: &str, sender: &str, content: Value, key: i64) -> StateEvent {
        StateEvent::new(
            RawEvent::new(
                event_type::MEMBER,
                Some(user.to_owned()),
                UserId::new(sender),
                EventId::new(format!("$m{key}")),
                0,
                content,
            ),
            OrderingKey::new(key),
        )
    }

    fn store() -> StateStore {
        let mut store = StateStore::new(RoomId::new("!r:example.org"));
        let me = "@me:example.org";
        store.apply(member_state(me, me, json!({"membership": "join"}), 1), None);
        store.apply(
            member_state(
                "@bob:example.org",
                "@bob:example.org",
                json!({"membership": "join", "displayname": "Bob"}),
                2,
            ),
            None,
        );
        let invite = json!({"membership": "invite"});
        store.apply(member_state("@carol:example.org", me, invite, 3), None);
        store
    }

    #[test]
    fn display_name_falls_back_to_localpart() {
        let store = store();
        assert_eq!(member_display_name(&store, &UserId::new("@bob:example.org")), "Bob");
        assert_eq!(member_display_name(&store, &UserId::new("@carol:example.org")), "carol");
        assert_eq!(member_display_name(&store, &UserId::new("@zed:example.org")), "zed");
    }

    #[test]
    fn snapshot_groups_members_and_keeps_hints() {
        let summary = RoomSummary {
            heroes: None,
            joined_member_count: Some(10),
            invited_member_count: None,
        };
        let snapshot = MembershipSnapshot::capture(&store(), &me(), &summary);
        assert_eq!(snapshot.members(Membership::Join).len(), 2);
        assert_eq!(snapshot.members(Membership::Invite), &[UserId::new("@carol:example.org")]);
        assert!(snapshot.members(Membership::Ban).is_empty());
        assert_eq!(snapshot.own, Some(Membership::Join));
        assert_eq!(snapshot.joined_count, Some(10));
    }

    #[test]
    fn direct_partner_from_account_data() {
        let data = json!({"@bob:example.org": ["!other:x", "!r:example.org"]});
        let partner = direct_chat_partner(&store(), &me(), Some(&data));
        assert_eq!(partner, Some(UserId::new("@bob:example.org")));
    }

    #[test]
    fn direct_partner_from_is_direct_flag() {
        let mut store = StateStore::new(RoomId::new("!r:example.org"));
        store.apply(
            member_state(
                "@me:example.org",
                "@bob:example.org",
                json!({"membership": "invite", "is_direct": true}),
                1,
            ),
            None,
        );
        assert_eq!(
            direct_chat_partner(&store, &me(), None),
            Some(UserId::new("@bob:example.org"))
        );
        assert_eq!(direct_chat_partner(&self::store(), &me(), Some(&json!({}))), None);
    }
}
