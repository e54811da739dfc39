//! Scripted, fault-injecting transport.
//!
//! Behaves like a well-mannered server: sends are idempotent per transaction
//! id, accepted events come back through [`ScriptedTransport::sync_update`]
//! carrying their transaction id, and older history is served page by page.
//! Faults are scripted per call or drawn from a seeded failure rate.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use parlor_client::{Transport, TransportError};
use parlor_core::Environment;
use parlor_proto::{
    EventId, PaginationChunk, RawEvent, RoomId, RoomUpdate, Timeline, TransactionId, UserId,
};
use serde_json::Value;

use crate::sim_env::SimEnv;

const PAGE_PREFIX: &str = "page:";

/// Scripted outcome of one transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Fail with this error.
    Fail(TransportError),
    /// Never answer.
    Hang,
}

/// An event the server accepted through `send`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    /// Target room.
    pub room_id: RoomId,
    /// Transaction id of the first accepted attempt.
    pub txn_id: TransactionId,
    /// Wire event type.
    pub event_type: String,
    /// Wire content.
    pub content: Value,
    /// Assigned event id.
    pub event_id: EventId,
}

/// A non-send call, recorded for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// `set_state`.
    SetState {
        /// Target room.
        room_id: RoomId,
        /// State type.
        event_type: String,
        /// State key.
        state_key: String,
        /// Content.
        content: Value,
    },
    /// `redact`.
    Redact {
        /// Target room.
        room_id: RoomId,
        /// Redacted event.
        event_id: EventId,
        /// Reason, if given.
        reason: Option<String>,
    },
    /// `leave`.
    Leave {
        /// Room left.
        room_id: RoomId,
    },
    /// `kick`.
    Kick {
        /// Room.
        room_id: RoomId,
        /// Kicked user.
        user_id: UserId,
    },
    /// `ban`.
    Ban {
        /// Room.
        room_id: RoomId,
        /// Banned user.
        user_id: UserId,
    },
    /// `invite`.
    Invite {
        /// Room.
        room_id: RoomId,
        /// Invited user.
        user_id: UserId,
    },
}

#[derive(Debug, Default)]
struct TransportState {
    send_faults: VecDeque<Fault>,
    page_faults: VecDeque<Fault>,
    call_faults: VecDeque<Fault>,
    failure_rate: f64,
    latency: Duration,
    attempts: usize,
    next_event: u64,
    delivered: Vec<Delivered>,
    by_txn: HashMap<TransactionId, EventId>,
    unsynced: Vec<usize>,
    history: BTreeMap<RoomId, Vec<RawEvent>>,
    history_state: BTreeMap<RoomId, Vec<RawEvent>>,
    calls: Vec<Call>,
}

/// In-memory [`Transport`] for simulations and tests.
#[derive(Debug)]
pub struct ScriptedTransport {
    env: SimEnv,
    sender: UserId,
    state: Mutex<TransportState>,
}

impl ScriptedTransport {
    /// Transport whose accepted events are sent by `sender`.
    pub fn new(env: SimEnv, sender: UserId) -> Self {
        Self { env, sender, state: Mutex::new(TransportState::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail each send attempt with probability `rate` (transiently).
    pub fn set_failure_rate(&self, rate: f64) {
        self.lock().failure_rate = rate.clamp(0.0, 1.0);
    }

    /// Virtual time every call takes.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Script the next `send` attempt.
    pub fn push_send_fault(&self, fault: Fault) {
        self.lock().send_faults.push_back(fault);
    }

    /// Script the next `count` send attempts with the same fault.
    pub fn push_send_faults(&self, fault: &Fault, count: usize) {
        let mut state = self.lock();
        state.send_faults.extend(std::iter::repeat_n(fault.clone(), count));
    }

    /// Script the next `fetch_older` call.
    pub fn push_page_fault(&self, fault: Fault) {
        self.lock().page_faults.push_back(fault);
    }

    /// Script the next non-send, non-pagination call.
    pub fn push_call_fault(&self, fault: Fault) {
        self.lock().call_faults.push_back(fault);
    }

    /// Older history of a room, newest first, and the state served with it.
    pub fn set_history(&self, room_id: &RoomId, events: Vec<RawEvent>, state: Vec<RawEvent>) {
        let mut guard = self.lock();
        guard.history.insert(room_id.clone(), events);
        guard.history_state.insert(room_id.clone(), state);
    }

    /// Number of `send` calls so far, failed ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    /// Every accepted event, in acceptance order.
    pub fn delivered(&self) -> Vec<Delivered> {
        self.lock().delivered.clone()
    }

    /// Every recorded non-send call.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Sync slice echoing every accepted, not yet echoed event of `room_id`.
    pub fn sync_update(&self, room_id: &RoomId) -> RoomUpdate {
        let wall = self.env.wall_clock_millis();
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.unsynced);

        let (echoed, kept): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|&index| &state.delivered[index].room_id == room_id);
        state.unsynced = kept;

        let events = echoed
            .into_iter()
            .map(|index| {
                let delivered = &state.delivered[index];
                RawEvent::new(
                    delivered.event_type.clone(),
                    None,
                    self.sender.clone(),
                    delivered.event_id.clone(),
                    wall,
                    delivered.content.clone(),
                )
                .with_transaction_id(&delivered.txn_id)
            })
            .collect();

        RoomUpdate { timeline: Timeline { events, ..Timeline::default() }, ..RoomUpdate::default() }
    }

    async fn delay(&self) {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            self.env.sleep(latency).await;
        }
    }

    async fn scripted(
        &self,
        take: impl FnOnce(&mut TransportState) -> Option<Fault>,
    ) -> Result<(), TransportError> {
        let fault = take(&mut self.lock());
        match fault {
            None => Ok(()),
            Some(Fault::Fail(error)) => Err(error),
            Some(Fault::Hang) => std::future::pending().await,
        }
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }
}

fn page_offset(token: Option<&str>) -> usize {
    token.and_then(|token| token.strip_prefix(PAGE_PREFIX)?.parse().ok()).unwrap_or(0)
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        room_id: &RoomId,
        event_type: &str,
        txn_id: &TransactionId,
        content: &Value,
    ) -> Result<EventId, TransportError> {
        self.delay().await;
        self.lock().attempts += 1;
        self.scripted(|state| state.send_faults.pop_front()).await?;

        let rate = self.lock().failure_rate;
        if rate > 0.0 && self.env.random_unit() < rate {
            return Err(TransportError::Transient { reason: "injected failure".to_owned() });
        }

        let mut state = self.lock();
        if let Some(event_id) = state.by_txn.get(txn_id) {
            return Ok(event_id.clone());
        }
        state.next_event += 1;
        let event_id = EventId::new(format!("$sim{}", state.next_event));
        state.by_txn.insert(txn_id.clone(), event_id.clone());
        let index = state.delivered.len();
        state.delivered.push(Delivered {
            room_id: room_id.clone(),
            txn_id: txn_id.clone(),
            event_type: event_type.to_owned(),
            content: content.clone(),
            event_id: event_id.clone(),
        });
        state.unsynced.push(index);
        Ok(event_id)
    }

    async fn set_state(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
        content: &Value,
    ) -> Result<EventId, TransportError> {
        self.delay().await;
        self.scripted(|state| state.call_faults.pop_front()).await?;
        self.record(Call::SetState {
            room_id: room_id.clone(),
            event_type: event_type.to_owned(),
            state_key: state_key.to_owned(),
            content: content.clone(),
        });
        let mut state = self.lock();
        state.next_event += 1;
        Ok(EventId::new(format!("$sim{}", state.next_event)))
    }

    async fn redact(
        &self,
        room_id: &RoomId,
        event_id: &EventId,
        _txn_id: &TransactionId,
        reason: Option<&str>,
    ) -> Result<EventId, TransportError> {
        self.delay().await;
        self.scripted(|state| state.call_faults.pop_front()).await?;
        self.record(Call::Redact {
            room_id: room_id.clone(),
            event_id: event_id.clone(),
            reason: reason.map(str::to_owned),
        });
        let mut state = self.lock();
        state.next_event += 1;
        Ok(EventId::new(format!("$sim{}", state.next_event)))
    }

    async fn fetch_older(
        &self,
        room_id: &RoomId,
        token: Option<&str>,
        limit: u32,
    ) -> Result<PaginationChunk, TransportError> {
        self.delay().await;
        self.scripted(|state| state.page_faults.pop_front()).await?;

        let state = self.lock();
        let history = state.history.get(room_id).map_or(&[][..], Vec::as_slice);
        let offset = page_offset(token).min(history.len());
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let end = offset.saturating_add(limit).min(history.len());

        Ok(PaginationChunk {
            chunk: history[offset..end].to_vec(),
            state: if offset < end {
                state.history_state.get(room_id).cloned().unwrap_or_default()
            } else {
                Vec::new()
            },
            start: token.map(str::to_owned),
            end: (end < history.len()).then(|| format!("{PAGE_PREFIX}{end}")),
        })
    }

    async fn leave(&self, room_id: &RoomId) -> Result<(), TransportError> {
        self.delay().await;
        self.scripted(|state| state.call_faults.pop_front()).await?;
        self.record(Call::Leave { room_id: room_id.clone() });
        Ok(())
    }

    async fn kick(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        _reason: Option<&str>,
    ) -> Result<(), TransportError> {
        self.delay().await;
        self.scripted(|state| state.call_faults.pop_front()).await?;
        self.record(Call::Kick { room_id: room_id.clone(), user_id: user_id.clone() });
        Ok(())
    }

    async fn ban(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        _reason: Option<&str>,
    ) -> Result<(), TransportError> {
        self.delay().await;
        self.scripted(|state| state.call_faults.pop_front()).await?;
        self.record(Call::Ban { room_id: room_id.clone(), user_id: user_id.clone() });
        Ok(())
    }

    async fn invite(&self, room_id: &RoomId, user_id: &UserId) -> Result<(), TransportError> {
        self.delay().await;
        self.scripted(|state| state.call_faults.pop_front()).await?;
        self.record(Call::Invite { room_id: room_id.clone(), user_id: user_id.clone() });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_tokens_round_trip_offsets() {
        assert_eq!(page_offset(None), 0);
        assert_eq!(page_offset(Some("s72_sync")), 0);
        assert_eq!(page_offset(Some("page:40")), 40);
    }
}
