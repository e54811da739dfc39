//! Bookkeeping for outgoing sends.
//!
//! A send lives in one of three maps:
//!
//! - `pending`: echo synthesized, not yet confirmed by sync
//! - `superseded`: sync confirmed it while a send attempt was still running;
//!   the next engine event for it settles as sent
//! - `failed`: terminal failure, kept so the caller can resend manually. At
//!   most [`MAX_FAILED_SENDS`] are kept; the oldest is forgotten first.
//!
//! Transaction ids are `<16 hex digits of randomness><counter>`, unique per
//! room for the lifetime of the queue.

use std::collections::{HashMap, VecDeque};

use parlor_proto::{EventId, StateEvent, TransactionId};
use serde_json::Value;

/// Failed sends kept for manual resend.
pub const MAX_FAILED_SENDS: usize = 100;

/// Delivery phase of a pending send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendPhase {
    /// Attempts are running.
    Sending,
    /// Transport accepted it; waiting for the sync copy.
    Sent(EventId),
}

/// An outgoing event between echo and confirmation.
#[derive(Debug, Clone)]
pub struct PendingSend<I> {
    /// Local echo as synthesized, plaintext and at its ordering key.
    pub echo: StateEvent,
    /// Sealed `(type, content)` handed to the transport, fixed at first
    /// attempt so retries repeat the exact payload.
    pub wire: Option<(String, Value)>,
    /// First attempt; the deadline is measured from here.
    pub started: I,
    /// Current phase.
    pub phase: SendPhase,
}

/// A send that reached the failed state.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedSend {
    /// Event type as composed.
    pub event_type: String,
    /// Plaintext content as composed.
    pub content: Value,
    /// Why it failed.
    pub reason: String,
}

impl FailedSend {
    /// Failed record for an echo.
    pub fn from_echo(echo: &StateEvent, reason: &str) -> Self {
        Self {
            event_type: echo.event_type().to_owned(),
            content: echo.raw_content().clone(),
            reason: reason.to_owned(),
        }
    }
}

/// All sends of one room.
#[derive(Debug, Clone)]
pub struct SendQueue<I> {
    prefix: String,
    counter: u64,
    pending: HashMap<TransactionId, PendingSend<I>>,
    superseded: HashMap<TransactionId, EventId>,
    failed: HashMap<TransactionId, FailedSend>,
    failed_order: VecDeque<TransactionId>,
}

impl<I> SendQueue<I> {
    /// Empty queue minting ids with the given random seed.
    pub fn new(random: u64) -> Self {
        Self {
            prefix: format!("{random:016x}"),
            counter: 0,
            pending: HashMap::new(),
            superseded: HashMap::new(),
            failed: HashMap::new(),
            failed_order: VecDeque::new(),
        }
    }

    /// Fresh transaction id.
    pub fn mint_txn_id(&mut self) -> TransactionId {
        self.counter += 1;
        TransactionId::new(format!("{}{}", self.prefix, self.counter))
    }

    /// Whether `txn_id` is in any map.
    pub fn is_known(&self, txn_id: &TransactionId) -> bool {
        self.pending.contains_key(txn_id)
            || self.superseded.contains_key(txn_id)
            || self.failed.contains_key(txn_id)
    }

    /// Track a new pending send.
    pub fn insert(&mut self, txn_id: TransactionId, send: PendingSend<I>) {
        self.pending.insert(txn_id, send);
    }

    /// Pending send, if any.
    pub fn pending(&self, txn_id: &TransactionId) -> Option<&PendingSend<I>> {
        self.pending.get(txn_id)
    }

    /// Mutable pending send, if any.
    pub fn pending_mut(&mut self, txn_id: &TransactionId) -> Option<&mut PendingSend<I>> {
        self.pending.get_mut(txn_id)
    }

    /// Number of pending sends.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Sync confirmed `txn_id` as `event_id`.
    ///
    /// Destroys the pending record. If attempts were still running the
    /// confirmation is parked in `superseded` for the send loop to pick up.
    /// A send that had already failed reached the server after all, so its
    /// failed record is dropped.
    pub fn confirm_by_sync(
        &mut self,
        txn_id: &TransactionId,
        event_id: &EventId,
    ) -> Option<PendingSend<I>> {
        if self.take_failed(txn_id).is_some() {
            return None;
        }
        let send = self.pending.remove(txn_id)?;
        if send.phase == SendPhase::Sending {
            self.superseded.insert(txn_id.clone(), event_id.clone());
        }
        Some(send)
    }

    /// Record a failure that has no pending record, e.g. an echo restored
    /// from a snapshot whose attempts were lost.
    pub fn insert_failed(&mut self, txn_id: TransactionId, failed: FailedSend) {
        if self.failed.insert(txn_id.clone(), failed).is_none() {
            self.failed_order.push_back(txn_id);
        }
        while self.failed.len() > MAX_FAILED_SENDS {
            let Some(oldest) = self.failed_order.pop_front() else {
                break;
            };
            if self.failed.remove(&oldest).is_some() {
                tracing::debug!(txn_id = %oldest, "oldest failed send forgotten");
            }
        }
    }

    /// Take a parked sync confirmation.
    pub fn take_superseded(&mut self, txn_id: &TransactionId) -> Option<EventId> {
        self.superseded.remove(txn_id)
    }

    /// Move a pending send to the failed map.
    pub fn fail(&mut self, txn_id: &TransactionId, reason: &str) -> Option<&FailedSend> {
        let send = self.pending.remove(txn_id)?;
        self.insert_failed(txn_id.clone(), FailedSend::from_echo(&send.echo, reason));
        self.failed.get(txn_id)
    }

    /// Failed send, if any.
    pub fn failed(&self, txn_id: &TransactionId) -> Option<&FailedSend> {
        self.failed.get(txn_id)
    }

    /// Remove a failed send for manual resending.
    pub fn take_failed(&mut self, txn_id: &TransactionId) -> Option<FailedSend> {
        let failed = self.failed.remove(txn_id)?;
        self.failed_order.retain(|queued| queued != txn_id);
        Some(failed)
    }

    /// Forget everything except the id counter.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.superseded.clear();
        self.failed.clear();
        self.failed_order.clear();
    }
}
