//! Model room: the reference implementation.
//!
//! Keeps every candidate ever offered to a slot and picks the newest at
//! observation time, instead of discarding losers on arrival like the real
//! store. Ordering keys are allocated with the same rules, so the two must
//! agree on which candidate is resident and in which status.

use std::{collections::BTreeMap, time::Duration};

use parlor_proto::{EventStatus, event_type};

use super::operation::Operation;
use crate::sim_env::SIM_EPOCH_MILLIS;

/// Slot identity: `(event type, state key)`.
pub type Slot = (String, String);

/// Observable state for oracle comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableState {
    /// Resident ordering key and status per slot.
    pub resident: BTreeMap<Slot, (i64, EventStatus)>,
    /// Sends not yet confirmed by sync nor failed.
    pub pending: usize,
}

#[derive(Debug, Clone)]
struct Candidate {
    key: i64,
    status: EventStatus,
    send: Option<u32>,
}

#[derive(Debug, Clone)]
struct ModelSend {
    id: u32,
    started: Duration,
    accepted: bool,
}

/// Reference model of one room.
#[derive(Debug, Clone)]
pub struct ModelRoom {
    now: Duration,
    wall: u64,
    send_timeout: Duration,
    last_forward: i64,
    last_backward: i64,
    slots: BTreeMap<Slot, Vec<Candidate>>,
    pending: Vec<ModelSend>,
    next_send: u32,
}

impl ModelRoom {
    /// Empty room whose sends give up after `send_timeout`.
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            now: Duration::ZERO,
            wall: SIM_EPOCH_MILLIS,
            send_timeout,
            last_forward: 0,
            last_backward: 0,
            slots: BTreeMap::new(),
            pending: Vec::new(),
            next_send: 0,
        }
    }

    /// Index into pending sends for an operation's `index`, if any exist.
    pub fn pending_index(&self, index: u8) -> Option<usize> {
        (!self.pending.is_empty()).then(|| usize::from(index) % self.pending.len())
    }

    /// Apply an operation.
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::LiveState { slot } => {
                let key = self.next_forward();
                self.offer(slot.resolve(), key, EventStatus::Synced, None);
            },
            Operation::BackfillState { slot } => {
                let message_key = self.next_backward();
                self.offer(message_slot(), message_key, EventStatus::Synced, None);
                let state_key = self.next_backward();
                self.offer(slot.resolve(), state_key, EventStatus::Synced, None);
            },
            Operation::SendMessage => {
                let key = self.next_forward();
                let id = self.next_send;
                self.next_send += 1;
                self.offer(message_slot(), key, EventStatus::Sending, Some(id));
                self.pending.push(ModelSend { id, started: self.now, accepted: false });
            },
            Operation::ConfirmSend { index } => {
                let Some(index) = self.pending_index(*index) else { return };
                if !self.pending[index].accepted {
                    self.pending[index].accepted = true;
                    self.set_status(self.pending[index].id, EventStatus::Sent);
                }
            },
            Operation::FailSend { index, transient } => {
                let Some(index) = self.pending_index(*index) else { return };
                let send = &self.pending[index];
                let retrying = *transient && self.now - send.started < self.send_timeout;
                if send.accepted || retrying {
                    return;
                }
                let send = self.pending.remove(index);
                self.set_status(send.id, EventStatus::Failed);
            },
            Operation::EchoSend { index } => {
                let Some(index) = self.pending_index(*index) else { return };
                let send = self.pending.remove(index);
                self.set_status(send.id, EventStatus::Synced);
            },
            Operation::AdvanceTime { secs } => {
                self.now += Duration::from_secs(u64::from(*secs));
                self.wall += u64::from(*secs) * 1_000;
            },
            Operation::Reset => {
                self.slots.clear();
                self.pending.clear();
                self.last_forward = 0;
                self.last_backward = 0;
            },
        }
    }

    /// Extract observable state for comparison.
    pub fn observable_state(&self) -> ObservableState {
        let resident = self
            .slots
            .iter()
            .filter_map(|(slot, candidates)| {
                let newest = candidates.iter().max_by_key(|candidate| candidate.key)?;
                Some((slot.clone(), (newest.key, newest.status)))
            })
            .collect();
        ObservableState { resident, pending: self.pending.len() }
    }

    fn next_forward(&mut self) -> i64 {
        let wall = i64::try_from(self.wall).unwrap_or(i64::MAX);
        self.last_forward = wall.max(self.last_forward + 1);
        self.last_forward
    }

    fn next_backward(&mut self) -> i64 {
        self.last_backward -= 1;
        self.last_backward
    }

    fn offer(&mut self, slot: Slot, key: i64, status: EventStatus, send: Option<u32>) {
        self.slots.entry(slot).or_default().push(Candidate { key, status, send });
    }

    fn set_status(&mut self, id: u32, status: EventStatus) {
        let candidate = self
            .slots
            .values_mut()
            .flatten()
            .find(|candidate| candidate.send == Some(id));
        if let Some(candidate) = candidate {
            candidate.status = status;
        }
    }
}

fn message_slot() -> Slot {
    (event_type::MESSAGE.to_owned(), String::new())
}
