//! Power-level permission evaluator.
//!
//! Reads the room's `m.room.power_levels` state. Every check is permissive by
//! default: if the state is absent, or the threshold for the requested
//! capability is absent, the capability is granted. Otherwise the user's
//! resolved level must be `>=` the threshold.

use parlor_proto::{EventKind, PowerLevelsContent, RoomContent, UserId, event_type};

use crate::state_store::StateStore;

/// Moderation actions gated by a single threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerAction {
    /// Ban a member.
    Ban,
    /// Kick a member.
    Kick,
    /// Invite a user.
    Invite,
    /// Redact another user's event.
    Redact,
}

impl PowerAction {
    /// Protocol name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::Kick => "kick",
            Self::Invite => "invite",
            Self::Redact => "redact",
        }
    }
}

/// Permission checks over one power-levels payload.
#[derive(Debug, Clone, Copy)]
pub struct Permissions<'a> {
    levels: Option<&'a PowerLevelsContent>,
}

impl<'a> Permissions<'a> {
    /// Evaluate against an explicit payload, or none.
    pub fn new(levels: Option<&'a PowerLevelsContent>) -> Self {
        Self { levels }
    }

    /// Evaluate against the store's resident power-levels state.
    ///
    /// A power-levels event whose payload failed to decode counts as absent.
    pub fn from_store(store: &'a StateStore) -> Self {
        let levels = store.get(event_type::POWER_LEVELS, "").and_then(|event| {
            match event.content() {
                RoomContent::PowerLevels(levels) => Some(levels),
                _ => None,
            }
        });
        Self { levels }
    }

    /// Underlying payload.
    pub fn levels(&self) -> Option<&'a PowerLevelsContent> {
        self.levels
    }

    /// Resolved level of a user: explicit entry, else `users_default`.
    ///
    /// With no power-levels state every user is at level 0.
    pub fn user_level(&self, user_id: &UserId) -> i64 {
        self.levels
            .map(|levels| levels.users.get(user_id).copied().unwrap_or(levels.users_default))
            .unwrap_or(0)
    }

    /// Whether `user_id` may send a message-like event of `event_type`.
    ///
    /// The per-type override wins; without one, types the taxonomy calls
    /// state fall back to `state_default` and everything else to
    /// `events_default`.
    pub fn can_send(&self, user_id: &UserId, event_type: &str) -> bool {
        self.can_send_kind(user_id, event_type, EventKind::classify(event_type, false))
    }

    /// Whether `user_id` may set state of `event_type`.
    ///
    /// Unknown types carrying a state key are state, so they fall back to
    /// `state_default`.
    pub fn can_send_state(&self, user_id: &UserId, event_type: &str) -> bool {
        self.can_send_kind(user_id, event_type, EventKind::classify(event_type, true))
    }

    fn can_send_kind(&self, user_id: &UserId, event_type: &str, kind: EventKind) -> bool {
        let Some(levels) = self.levels else {
            return true;
        };
        let threshold = levels.events.get(event_type).copied().or(match kind {
            EventKind::State => levels.state_default,
            EventKind::MessageLike => levels.events_default,
        });
        self.meets(user_id, threshold)
    }

    /// Whether `user_id` may send plain messages without a per-type override.
    pub fn can_send_default_messages(&self, user_id: &UserId) -> bool {
        self.meets(user_id, self.levels.and_then(|levels| levels.events_default))
    }

    /// Whether `user_id` may change room state without a per-type override.
    pub fn can_change_state(&self, user_id: &UserId) -> bool {
        self.meets(user_id, self.levels.and_then(|levels| levels.state_default))
    }

    /// Whether `user_id` may perform a moderation action.
    pub fn can_perform(&self, user_id: &UserId, action: PowerAction) -> bool {
        let threshold = self.levels.and_then(|levels| match action {
            PowerAction::Ban => levels.ban,
            PowerAction::Kick => levels.kick,
            PowerAction::Invite => levels.invite,
            PowerAction::Redact => levels.redact,
        });
        self.meets(user_id, threshold)
    }

    /// Shorthand for [`PowerAction::Invite`].
    pub fn can_invite(&self, user_id: &UserId) -> bool {
        self.can_perform(user_id, PowerAction::Invite)
    }

    /// Shorthand for [`PowerAction::Kick`].
    pub fn can_kick(&self, user_id: &UserId) -> bool {
        self.can_perform(user_id, PowerAction::Kick)
    }

    /// Shorthand for [`PowerAction::Ban`].
    pub fn can_ban(&self, user_id: &UserId) -> bool {
        self.can_perform(user_id, PowerAction::Ban)
    }

    /// Shorthand for [`PowerAction::Redact`].
    pub fn can_redact(&self, user_id: &UserId) -> bool {
        self.can_perform(user_id, PowerAction::Redact)
    }

    /// Whether `actor` may set `target`'s level to `new_level`.
    ///
    /// Requires permission to send power-levels state, a `new_level` no
    /// higher than the actor's own, and (unless demoting oneself) a target
    /// currently below the actor.
    pub fn can_change_power_level(&self, actor: &UserId, target: &UserId, new_level: i64) -> bool {
        if self.levels.is_none() {
            return true;
        }
        if !self.can_send_state(actor, event_type::POWER_LEVELS) {
            return false;
        }
        let own = self.user_level(actor);
        if actor == target {
            return new_level <= own;
        }
        self.user_level(target) < own && new_level <= own
    }

    fn meets(&self, user_id: &UserId, threshold: Option<i64>) -> bool {
        threshold.is_none_or(|threshold| self.user_level(user_id) >= threshold)
    }
}

/// Copy of `levels` (or an empty payload) with `user_id` set to `level`.
///
/// Setting a user to the default level removes the explicit entry.
pub fn with_user_level(
    levels: Option<&PowerLevelsContent>,
    user_id: &UserId,
    level: i64,
) -> PowerLevelsContent {
    let mut next = levels.cloned().unwrap_or_default();
    if level == next.users_default {
        next.users.remove(user_id);
    } else {
        next.users.insert(user_id.clone(), level);
    }
    next
}
