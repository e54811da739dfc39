//! Model-based property tests.
//!
//! These tests generate random operation sequences and verify that the real
//! room engine behaves identically to the reference model.
//!
//! # Architecture
//!
//! ```text
//! proptest generates: Vec<Operation>
//!                          │
//!           ┌──────────────┼──────────────┐
//!           ▼              ▼              ▼
//!      ModelRoom      RealWorld       Compare
//!      (reference)    (Room<SimEnv>)  observable state
//! ```

use std::{collections::BTreeMap, time::Duration};

use parlor_client::{Room, RoomAction, RoomConfig, RoomEvent, TransportError};
use parlor_core::Environment;
use parlor_harness::{ModelRoom, ObservableState, Operation, SimEnv, SmallSlot, fixtures};
use parlor_proto::{
    EventId, PaginationChunk, RawEvent, RoomId, RoomUpdate, Timeline, TransactionId, UserId,
    event_type,
};
use proptest::prelude::*;
use serde_json::{Value, json};

const SEND_TIMEOUT: Duration = Duration::from_secs(60);

fn me() -> UserId {
    UserId::new("@me:sim")
}

/// Real system wrapper that mirrors `ModelRoom`'s interface.
struct RealWorld {
    env: SimEnv,
    room: Room<SimEnv>,
    /// Unsettled transactions in issue order.
    pending: Vec<TransactionId>,
    next_event: u32,
}

impl RealWorld {
    fn new(seed: u64) -> Self {
        let env = SimEnv::with_seed(seed);
        let config = RoomConfig { send_timeout: SEND_TIMEOUT, ..RoomConfig::default() };
        let room = Room::new(env.clone(), RoomId::new("!model:sim"), me(), config);
        Self { env, room, pending: Vec::new(), next_event: 0 }
    }

    fn handle(&mut self, event: RoomEvent) -> Vec<RoomAction> {
        match self.room.handle(event) {
            Ok(actions) => actions,
            Err(e) => panic!("room rejected operation: {e}"),
        }
    }

    fn event_id(&mut self) -> EventId {
        self.next_event += 1;
        EventId::new(format!("$real{}", self.next_event))
    }

    fn pending_index(&self, index: u8) -> Option<usize> {
        (!self.pending.is_empty()).then(|| usize::from(index) % self.pending.len())
    }

    fn apply(&mut self, op: &Operation) {
        match op {
            Operation::LiveState { slot } => {
                let event = state_for(*slot, "live");
                self.handle(RoomEvent::Sync(fixtures::state_update(vec![event])));
            },
            Operation::BackfillState { slot } => self.backfill(*slot),
            Operation::SendMessage => {
                let actions = self.handle(RoomEvent::Send {
                    event_type: event_type::MESSAGE.to_owned(),
                    content: json!({"msgtype": "m.text", "body": "hello"}),
                    txn_id: None,
                });
                let txn_id = actions.into_iter().find_map(|action| match action {
                    RoomAction::Transmit { txn_id, .. } => Some(txn_id),
                    _ => None,
                });
                self.pending.extend(txn_id);
            },
            Operation::ConfirmSend { index } => {
                let Some(index) = self.pending_index(*index) else { return };
                let txn_id = self.pending[index].clone();
                let event_id = self.event_id();
                self.handle(RoomEvent::SendSucceeded { txn_id, event_id });
            },
            Operation::FailSend { index, transient } => {
                let Some(index) = self.pending_index(*index) else { return };
                let error = if *transient {
                    TransportError::Transient { reason: "502".to_owned() }
                } else {
                    TransportError::Rejected { errcode: "M_FORBIDDEN".to_owned() }
                };
                let txn_id = self.pending[index].clone();
                let actions = self.handle(RoomEvent::SendFailed { txn_id, error });
                if actions.iter().any(|action| matches!(action, RoomAction::SendSettled { .. })) {
                    self.pending.remove(index);
                }
            },
            Operation::EchoSend { index } => {
                let Some(index) = self.pending_index(*index) else { return };
                let txn_id = self.pending.remove(index);
                let event_id = self.event_id();
                let echoed = RawEvent::new(
                    event_type::MESSAGE,
                    None,
                    me(),
                    event_id,
                    self.env.wall_clock_millis(),
                    json!({"msgtype": "m.text", "body": "hello"}),
                )
                .with_transaction_id(&txn_id);
                let update = RoomUpdate {
                    timeline: Timeline { events: vec![echoed], ..Timeline::default() },
                    ..RoomUpdate::default()
                };
                self.handle(RoomEvent::Sync(update));
            },
            Operation::AdvanceTime { secs } => {
                self.env.advance(Duration::from_secs(u64::from(*secs)));
            },
            Operation::Reset => {
                self.handle(RoomEvent::Reset);
                self.pending.clear();
            },
        }
    }

    fn backfill(&mut self, slot: SmallSlot) {
        let actions = self.handle(RoomEvent::PaginationRequested { limit: 10 });
        let Some(request_id) = actions.into_iter().find_map(|action| match action {
            RoomAction::FetchOlder { request_id, .. } => Some(request_id),
            _ => None,
        }) else {
            panic!("pagination did not start");
        };

        let chunk = PaginationChunk {
            chunk: vec![fixtures::message(&UserId::new("@old:sim"), "older", 1)],
            state: vec![state_for(slot, "old")],
            start: None,
            end: Some(format!("before-{request_id}")),
        };
        self.handle(RoomEvent::PaginationResponse { request_id, chunk });
    }

    fn observable_state(&self) -> ObservableState {
        let resident: BTreeMap<_, _> = self
            .room
            .store()
            .iter()
            .map(|event| {
                let state_key = event.state_key().unwrap_or_default().to_owned();
                let slot = (event.event_type().to_owned(), state_key);
                (slot, (event.ordering_key().value(), event.status()))
            })
            .collect();
        ObservableState { resident, pending: self.room.pending_sends() }
    }
}

fn state_for(slot: SmallSlot, label: &str) -> RawEvent {
    let (ty, state_key) = slot.resolve();
    let content: Value = match ty.as_str() {
        event_type::NAME => json!({"name": label}),
        event_type::TOPIC => json!({"topic": label}),
        _ => json!({"membership": "join", "displayname": label}),
    };
    fixtures::state(&ty, &state_key, &UserId::new("@u0:sim"), content)
}

/// Strategy for generating operations, weighted towards sends.
fn operation_strategy() -> impl Strategy<Value = Operation> {
    let slot = (any::<u8>(), any::<u8>()).prop_map(|(kind, key)| SmallSlot { kind, key });

    prop_oneof![
        3 => slot.clone().prop_map(|slot| Operation::LiveState { slot }),
        2 => slot.prop_map(|slot| Operation::BackfillState { slot }),
        4 => Just(Operation::SendMessage),
        2 => any::<u8>().prop_map(|index| Operation::ConfirmSend { index }),
        2 => (any::<u8>(), any::<bool>())
            .prop_map(|(index, transient)| Operation::FailSend { index, transient }),
        2 => any::<u8>().prop_map(|index| Operation::EchoSend { index }),
        2 => (0u8..90).prop_map(|secs| Operation::AdvanceTime { secs }),
        1 => Just(Operation::Reset),
    ]
}

proptest! {
    /// Verify that the resident state matches after every operation.
    ///
    /// This is the core model-based test. It generates random operation
    /// sequences and asserts that both implementations agree on which event
    /// holds every slot, with which ordering key and status.
    #[test]
    fn prop_model_matches_real(
        seed in any::<u64>(),
        ops in prop::collection::vec(operation_strategy(), 0..60)
    ) {
        let mut model = ModelRoom::new(SEND_TIMEOUT);
        let mut real = RealWorld::new(seed);

        for (i, op) in ops.iter().enumerate() {
            model.apply(op);
            real.apply(op);

            prop_assert_eq!(
                model.observable_state(),
                real.observable_state(),
                "Divergence at operation {}: {:?}",
                i,
                op
            );
        }
    }

    /// Forward keys never move backwards, even when the wall clock does.
    #[test]
    fn prop_sends_order_by_issue_despite_clock_jumps(
        jumps in prop::collection::vec(0u64..2_000_000_000_000, 1..20)
    ) {
        let mut real = RealWorld::new(0);
        let mut last = i64::MIN;
        for wall in jumps {
            real.env.set_wall_clock(wall);
            real.apply(&Operation::SendMessage);
            let key = real
                .room
                .store()
                .get(event_type::MESSAGE, "")
                .map(|event| event.ordering_key().value())
                .unwrap_or(i64::MIN);
            prop_assert!(key > last, "key {} after {}", key, last);
            last = key;
        }
    }
}

#[test]
fn model_and_real_agree_on_a_scripted_run() {
    let slot = SmallSlot { kind: 0, key: 0 };
    let ops = [
        Operation::SendMessage,
        Operation::LiveState { slot },
        Operation::BackfillState { slot },
        Operation::FailSend { index: 0, transient: true },
        Operation::AdvanceTime { secs: 61 },
        Operation::FailSend { index: 0, transient: true },
        Operation::SendMessage,
        Operation::ConfirmSend { index: 0 },
        Operation::EchoSend { index: 0 },
    ];

    let mut model = ModelRoom::new(SEND_TIMEOUT);
    let mut real = RealWorld::new(1);
    for op in &ops {
        model.apply(op);
        real.apply(op);
    }

    let state = real.observable_state();
    assert_eq!(model.observable_state(), state);
    assert_eq!(state.pending, 0);
}
