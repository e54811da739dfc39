//! Room events (inputs) and actions (outputs).
//!
//! [`Room::handle`](crate::Room::handle) consumes one [`RoomEvent`] and
//! returns the [`RoomAction`]s the caller must execute. The room itself
//! performs no I/O.

use std::time::Duration;

use parlor_proto::{EventId, PaginationChunk, RoomId, RoomUpdate, StateEvent, TransactionId};
use serde_json::Value;

use crate::{error::TransportError, snapshot::RoomSnapshot};

/// Input to the room state machine.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Per-room slice of a sync response.
    Sync(RoomUpdate),

    /// Start sending an event. Content is final (already composed).
    Send {
        /// Event type.
        event_type: String,
        /// Final plaintext content.
        content: Value,
        /// Caller-chosen transaction id; minted if absent.
        txn_id: Option<TransactionId>,
    },

    /// Transport accepted a send.
    SendSucceeded {
        /// Transaction that succeeded.
        txn_id: TransactionId,
        /// Server-assigned event id.
        event_id: EventId,
    },

    /// Transport failed a send attempt.
    SendFailed {
        /// Transaction that failed.
        txn_id: TransactionId,
        /// Failure reported by the transport.
        error: TransportError,
    },

    /// The send deadline passed while an attempt was still running.
    SendTimedOut {
        /// Transaction whose attempt never answered.
        txn_id: TransactionId,
    },

    /// Retry wait for a send elapsed.
    RetryDue {
        /// Transaction to retry.
        txn_id: TransactionId,
    },

    /// Caller abandoned a send.
    CancelSend {
        /// Transaction to abandon.
        txn_id: TransactionId,
    },

    /// Caller re-invokes a failed send. A new transaction id is minted.
    Resend {
        /// Failed transaction to resend.
        txn_id: TransactionId,
    },

    /// Caller wants older history.
    PaginationRequested {
        /// Maximum number of events.
        limit: u32,
    },

    /// Transport returned a pagination chunk.
    PaginationResponse {
        /// Request the chunk answers.
        request_id: u64,
        /// Returned events.
        chunk: PaginationChunk,
    },

    /// Transport failed a pagination request.
    PaginationFailed {
        /// Request that failed.
        request_id: u64,
    },

    /// Drop all local state and start over.
    Reset,
}

/// Output of the room state machine.
#[derive(Debug, Clone)]
pub enum RoomAction {
    /// Call the transport's `send`.
    Transmit {
        /// Idempotence key for the call.
        txn_id: TransactionId,
        /// Wire event type (`m.room.encrypted` when sealed).
        event_type: String,
        /// Wire content.
        content: Value,
    },

    /// Wait, then feed [`RoomEvent::RetryDue`].
    ScheduleRetry {
        /// Transaction to retry.
        txn_id: TransactionId,
        /// How long to wait.
        delay: Duration,
    },

    /// A send reached a terminal outcome.
    SendSettled {
        /// Settled transaction.
        txn_id: TransactionId,
        /// Its outcome.
        outcome: SendOutcome,
    },

    /// Call the transport's `fetch_older`.
    FetchOlder {
        /// Id to echo back in the response event.
        request_id: u64,
        /// Continuation token, `None` if never seen.
        token: Option<String>,
        /// Maximum number of events.
        limit: u32,
    },

    /// A pagination request finished without needing the transport, or its
    /// response was applied.
    PaginationSettled {
        /// Request that finished, `None` if no request was issued.
        request_id: Option<u64>,
        /// Result for the caller.
        outcome: PaginationOutcome,
    },

    /// Deliver to subscribers.
    Notify(RoomNotification),

    /// Store this snapshot.
    Persist(Box<RoomSnapshot>),
}

/// Terminal outcome of a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted by the server.
    Sent(EventId),
    /// Gave up.
    Failed {
        /// Why.
        reason: String,
    },
    /// Abandoned by the caller.
    Cancelled,
}

/// Result of a pagination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationOutcome {
    /// Events were applied.
    Applied {
        /// Number of timeline events delivered as backfill.
        count: usize,
    },
    /// Nothing older exists.
    Exhausted,
    /// The response arrived after a limited sync replaced the token and was
    /// dropped unapplied.
    Discarded,
}

/// Where timeline events came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineOrigin {
    /// Live sync or local echo.
    Live,
    /// Backward pagination.
    Backfill,
}

/// Notification delivered to room subscribers.
#[derive(Debug, Clone)]
pub enum RoomNotification {
    /// Some state slot changed.
    StateChanged {
        /// Room that changed.
        room_id: RoomId,
    },
    /// Timeline events arrived.
    Timeline {
        /// Room of the events.
        room_id: RoomId,
        /// Events, in delivery order.
        events: Vec<StateEvent>,
        /// Live or backfill.
        origin: TimelineOrigin,
    },
    /// An echo changed identity or status.
    EventUpdated {
        /// Room of the event.
        room_id: RoomId,
        /// Transaction the echo belongs to.
        txn_id: TransactionId,
        /// New version of the event.
        event: StateEvent,
    },
    /// A send reached the failed state.
    SendFailed {
        /// Room of the send.
        room_id: RoomId,
        /// Failed transaction.
        txn_id: TransactionId,
        /// Why.
        reason: String,
    },
    /// Room account data changed.
    AccountDataChanged {
        /// Room whose account data changed.
        room_id: RoomId,
        /// Changed types.
        types: Vec<String>,
    },
    /// Ephemeral data changed.
    EphemeralChanged {
        /// Room whose ephemeral data changed.
        room_id: RoomId,
        /// Changed types.
        types: Vec<String>,
    },
}

impl RoomNotification {
    /// Room the notification is about.
    pub fn room_id(&self) -> &RoomId {
        match self {
            Self::StateChanged { room_id }
            | Self::Timeline { room_id, .. }
            | Self::EventUpdated { room_id, .. }
            | Self::SendFailed { room_id, .. }
            | Self::AccountDataChanged { room_id, .. }
            | Self::EphemeralChanged { room_id, .. } => room_id,
        }
    }
}
