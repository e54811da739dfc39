//! Room state store and its merge rule.
//!
//! Holds at most one event per (event type, state key) slot. Message-like
//! events occupy the slot keyed by the empty state key, which is what lets
//! the derived view pick the latest message as a room preview.
//!
//! # Merge rule
//!
//! 1. Reject shapes invalid for the taxonomy: message-like types carrying a
//!    state key, and verification traffic of any shape. State types missing
//!    a state key get the empty key.
//! 2. Open encrypted envelopes when a [`Crypto`] collaborator is given. On
//!    failure the envelope itself is admitted.
//! 3. Admit into an empty slot unconditionally; into an occupied slot only
//!    with a strictly greater ordering key. Ties keep the resident event.
//!
//! The store never notifies anyone. Callers fan out after an admission.

use std::collections::HashMap;

use parlor_proto::{
    EventKind, OrderingKey, RawEvent, RoomId, StateEvent, TransactionId, event_type,
};

use crate::crypto::Crypto;

/// Slot key: (event type, state key).
pub type SlotKey = (String, String);

/// Latest known event per (type, state key) for one room.
#[derive(Debug, Clone)]
pub struct StateStore {
    room_id: RoomId,
    slots: HashMap<SlotKey, StateEvent>,
}

impl StateStore {
    /// Create an empty store for a room.
    pub fn new(room_id: RoomId) -> Self {
        Self { room_id, slots: HashMap::new() }
    }

    /// Room this store belongs to.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Offer a candidate. Returns whether it was admitted.
    pub fn apply(&mut self, candidate: StateEvent, crypto: Option<&dyn Crypto>) -> bool {
        let Some(candidate) = self.prepare(candidate, crypto) else {
            return false;
        };

        let key = slot_key(&candidate);
        if let Some(resident) = self.slots.get(&key) {
            if candidate.ordering_key() <= resident.ordering_key() {
                tracing::trace!(
                    event_type = %key.0,
                    state_key = %key.1,
                    candidate = %candidate.ordering_key(),
                    resident = %resident.ordering_key(),
                    "stale candidate ignored"
                );
                return false;
            }
        }

        tracing::debug!(
            room_id = %self.room_id,
            event_type = %key.0,
            state_key = %key.1,
            ordering_key = %candidate.ordering_key(),
            "state admitted"
        );
        self.slots.insert(key, candidate);
        true
    }

    /// Steps 1 and 2 of the merge rule: shape checks and decryption.
    ///
    /// `None` means the candidate can never be admitted.
    pub fn prepare(
        &self,
        candidate: StateEvent,
        crypto: Option<&dyn Crypto>,
    ) -> Option<StateEvent> {
        let candidate = normalize(candidate)?;
        let Some(crypto) = crypto.filter(|_| candidate.is_encrypted()) else {
            return Some(candidate);
        };

        match crypto.decrypt(&self.room_id, candidate.raw()) {
            Ok(plain) => normalize(StateEvent::with_status(
                plain,
                candidate.ordering_key(),
                candidate.status(),
            )),
            Err(e) => {
                tracing::warn!(
                    room_id = %self.room_id,
                    event_id = %candidate.event_id(),
                    "decryption failed, keeping envelope: {e}"
                );
                Some(candidate)
            },
        }
    }

    /// Exact-match lookup.
    pub fn get(&self, event_type: &str, state_key: &str) -> Option<&StateEvent> {
        self.slots.get(&(event_type.to_owned(), state_key.to_owned()))
    }

    /// All resident events of one type.
    pub fn of_type<'a>(&'a self, event_type: &'a str) -> impl Iterator<Item = &'a StateEvent> {
        self.slots.iter().filter(move |((ty, _), _)| ty == event_type).map(|(_, event)| event)
    }

    /// All resident events.
    pub fn iter(&self) -> impl Iterator<Item = &StateEvent> {
        self.slots.values()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Greatest ordering key among resident events.
    pub fn max_ordering_key(&self) -> Option<OrderingKey> {
        self.slots.values().map(StateEvent::ordering_key).max()
    }

    /// Replace the resident local echo for `txn_id`, bypassing the merge
    /// rule.
    ///
    /// Used to reconcile an echo with its send outcome at the same ordering
    /// key. Returns the replacement, or `None` if the slot has since moved on
    /// to another event. A replacement of another type (an envelope that
    /// could not be opened) moves to its own slot under the merge rule.
    pub fn update_echo(
        &mut self,
        txn_id: &TransactionId,
        update: impl FnOnce(&StateEvent) -> StateEvent,
    ) -> Option<StateEvent> {
        let key = self
            .slots
            .iter()
            .find(|(_, event)| event.transaction_id().as_ref() == Some(txn_id))
            .map(|(key, _)| key.clone())?;
        let next = update(self.slots.get(&key)?);

        let next_key = slot_key(&next);
        if next_key == key {
            self.slots.insert(key, next.clone());
            return Some(next);
        }

        self.slots.remove(&key);
        let admitted = self
            .slots
            .get(&next_key)
            .is_none_or(|resident| next.ordering_key() > resident.ordering_key());
        if admitted {
            self.slots.insert(next_key, next.clone());
        }
        Some(next)
    }

    /// Drop every slot. Used when the room is rebuilt from scratch.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

fn slot_key(event: &StateEvent) -> SlotKey {
    (event.event_type().to_owned(), event.state_key().unwrap_or_default().to_owned())
}

/// Apply the shape rules. `None` means the candidate must be dropped.
fn normalize(candidate: StateEvent) -> Option<StateEvent> {
    if event_type::is_verification(candidate.event_type(), candidate.raw_content()) {
        tracing::trace!(event_id = %candidate.event_id(), "verification event not admitted");
        return None;
    }

    let has_state_key = candidate.state_key().is_some();
    match EventKind::classify(candidate.event_type(), has_state_key) {
        EventKind::MessageLike if has_state_key => {
            tracing::debug!(
                event_type = candidate.event_type(),
                event_id = %candidate.event_id(),
                "message-like event with state key dropped"
            );
            None
        },
        EventKind::State if !has_state_key => {
            let raw = RawEvent { state_key: Some(String::new()), ..candidate.raw().clone() };
            Some(StateEvent::with_status(raw, candidate.ordering_key(), candidate.status()))
        },
        _ => Some(candidate),
    }
}
