//! Operations for model-based testing.
//!
//! Operations are generated randomly by proptest and applied to both the
//! model and a real `Room`. They are small so proptest can shrink failures to
//! short sequences.

use arbitrary::Arbitrary;
use parlor_proto::event_type;

/// A state slot from a deliberately tiny space, so collisions are common.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub struct SmallSlot {
    /// Selects the event type.
    pub kind: u8,
    /// Selects the state key where the type has one per user.
    pub key: u8,
}

impl SmallSlot {
    /// `(event type, state key)` of the slot.
    pub fn resolve(self) -> (String, String) {
        match self.kind % 3 {
            0 => (event_type::NAME.to_owned(), String::new()),
            1 => (event_type::TOPIC.to_owned(), String::new()),
            _ => (event_type::MEMBER.to_owned(), format!("@u{}:sim", self.key % 2)),
        }
    }
}

/// Operations that can be applied to a room.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// A live sync delivers one state event.
    LiveState {
        /// Target slot.
        slot: SmallSlot,
    },

    /// A pagination response delivers one message and one state event.
    BackfillState {
        /// Target slot.
        slot: SmallSlot,
    },

    /// The local user sends a message.
    SendMessage,

    /// The transport accepts a pending send.
    ConfirmSend {
        /// Index into the pending sends, in issue order.
        index: u8,
    },

    /// The transport fails a pending send attempt.
    FailSend {
        /// Index into the pending sends, in issue order.
        index: u8,
        /// Transient (retryable) or a rejection.
        transient: bool,
    },

    /// A live sync echoes a pending send back with its transaction id.
    EchoSend {
        /// Index into the pending sends, in issue order.
        index: u8,
    },

    /// Advance simulation time.
    AdvanceTime {
        /// Seconds to advance.
        secs: u8,
    },

    /// Drop all local state.
    Reset,
}
