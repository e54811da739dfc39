//! Fuzz target for the [`Room`] state machine
//!
//! # Strategy
//!
//! - Event sequences: syncs, sends, transport outcomes for known and
//!   unknown transactions, retries, cancels, pagination and resets
//! - Time: wall clock jumps in both directions between events
//!
//! # Invariants
//!
//! - The newest ordering key never decreases between resets
//! - Pending sends never exceed sends issued since the last reset
//! - NEVER panic on out-of-order transport outcomes

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parlor_client::{Room, RoomAction, RoomConfig, RoomEvent, TransportError};
use parlor_harness::{fixtures, SimEnv};
use parlor_proto::{
    event_type, EventId, PaginationChunk, RoomId, RoomUpdate, Timeline, TransactionId, UserId,
};
use serde_json::json;

#[derive(Debug, Clone, Arbitrary)]
enum FuzzEvent {
    LiveMessage { ts: u32 },
    LiveName { name: String },
    LimitedSync,
    Send { body: String },
    Succeed { txn: u8 },
    Fail { txn: u8, kind: u8 },
    Retry { txn: u8 },
    TimedOut { txn: u8 },
    Cancel { txn: u8 },
    Resend { txn: u8 },
    Paginate { limit: u8 },
    Respond { request: u8, events: u8, terminal: bool },
    PaginationFailed { request: u8 },
    Advance { secs: u8 },
    JumpWallClock { millis: u64 },
    Reset,
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    seed: u64,
    events: Vec<FuzzEvent>,
}

struct Harness {
    env: SimEnv,
    room: Room<SimEnv>,
    txns: Vec<TransactionId>,
    requests: Vec<u64>,
    sends_since_reset: usize,
    next_event: u64,
}

impl Harness {
    fn txn(&self, index: u8) -> TransactionId {
        if self.txns.is_empty() {
            return TransactionId::new("unknown");
        }
        self.txns[usize::from(index) % self.txns.len()].clone()
    }

    fn request(&self, index: u8) -> u64 {
        if self.requests.is_empty() {
            return u64::from(index);
        }
        self.requests[usize::from(index) % self.requests.len()]
    }

    fn event_id(&mut self) -> EventId {
        self.next_event += 1;
        EventId::new(format!("$fuzz{}", self.next_event))
    }

    fn to_room_event(&mut self, event: FuzzEvent) -> Option<RoomEvent> {
        let me = UserId::new("@me:fuzz");
        let event = match event {
            FuzzEvent::LiveMessage { ts } => {
                let message = fixtures::message(&me, "live", u64::from(ts));
                RoomEvent::Sync(RoomUpdate {
                    timeline: Timeline { events: vec![message], ..Timeline::default() },
                    ..RoomUpdate::default()
                })
            },
            FuzzEvent::LiveName { name } => {
                RoomEvent::Sync(fixtures::state_update(vec![fixtures::name(&me, &name)]))
            },
            FuzzEvent::LimitedSync => RoomEvent::Sync(RoomUpdate {
                timeline: Timeline {
                    limited: true,
                    prev_batch: Some("gap".to_owned()),
                    ..Timeline::default()
                },
                ..RoomUpdate::default()
            }),
            FuzzEvent::Send { body } => RoomEvent::Send {
                event_type: event_type::MESSAGE.to_owned(),
                content: json!({"msgtype": "m.text", "body": body}),
                txn_id: None,
            },
            FuzzEvent::Succeed { txn } => {
                RoomEvent::SendSucceeded { txn_id: self.txn(txn), event_id: self.event_id() }
            },
            FuzzEvent::Fail { txn, kind } => {
                let error = match kind % 3 {
                    0 => TransportError::Transient { reason: "fuzz".to_owned() },
                    1 => TransportError::Rejected { errcode: "M_FUZZ".to_owned() },
                    _ => TransportError::RateLimited { retry_after: None },
                };
                RoomEvent::SendFailed { txn_id: self.txn(txn), error }
            },
            FuzzEvent::Retry { txn } => RoomEvent::RetryDue { txn_id: self.txn(txn) },
            FuzzEvent::TimedOut { txn } => RoomEvent::SendTimedOut { txn_id: self.txn(txn) },
            FuzzEvent::Cancel { txn } => RoomEvent::CancelSend { txn_id: self.txn(txn) },
            FuzzEvent::Resend { txn } => RoomEvent::Resend { txn_id: self.txn(txn) },
            FuzzEvent::Paginate { limit } => {
                RoomEvent::PaginationRequested { limit: u32::from(limit) }
            },
            FuzzEvent::Respond { request, events, terminal } => {
                let sender = UserId::new("@old:fuzz");
                let chunk = (0..events % 8)
                    .map(|n| fixtures::message(&sender, "old", u64::from(n)))
                    .collect();
                let request_id = self.request(request);
                RoomEvent::PaginationResponse {
                    request_id,
                    chunk: PaginationChunk {
                        chunk,
                        state: Vec::new(),
                        start: None,
                        end: (!terminal).then(|| format!("before-{request_id}")),
                    },
                }
            },
            FuzzEvent::PaginationFailed { request } => {
                RoomEvent::PaginationFailed { request_id: self.request(request) }
            },
            FuzzEvent::Advance { secs } => {
                self.env.advance(Duration::from_secs(u64::from(secs)));
                return None;
            },
            FuzzEvent::JumpWallClock { millis } => {
                self.env.set_wall_clock(millis % 4_000_000_000_000);
                return None;
            },
            FuzzEvent::Reset => RoomEvent::Reset,
        };
        Some(event)
    }
}

fuzz_target!(|input: FuzzInput| {
    let env = SimEnv::with_seed(input.seed);
    let room = Room::new(
        env.clone(),
        RoomId::new("!fuzz:fuzz"),
        UserId::new("@me:fuzz"),
        RoomConfig::default(),
    );
    let mut harness = Harness {
        env,
        room,
        txns: Vec::new(),
        requests: Vec::new(),
        sends_since_reset: 0,
        next_event: 0,
    };
    let mut newest = None;

    for event in input.events {
        let Some(event) = harness.to_room_event(event) else {
            continue;
        };
        let is_reset = matches!(event, RoomEvent::Reset);
        let is_send = matches!(event, RoomEvent::Send { .. } | RoomEvent::Resend { .. });

        let Ok(actions) = harness.room.handle(event) else {
            continue;
        };

        if is_reset {
            newest = None;
            harness.sends_since_reset = 0;
            harness.requests.clear();
        }
        if is_send {
            harness.sends_since_reset += 1;
        }

        for action in actions {
            match action {
                RoomAction::Transmit { txn_id, .. } => harness.txns.push(txn_id),
                RoomAction::FetchOlder { request_id, .. } => harness.requests.push(request_id),
                _ => {},
            }
        }

        let current = harness.room.store().max_ordering_key();
        assert!(current >= newest, "newest key went from {newest:?} to {current:?}");
        newest = current;
        assert!(harness.room.pending_sends() <= harness.sends_since_reset);
    }
});
