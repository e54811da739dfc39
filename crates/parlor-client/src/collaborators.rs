//! External collaborator interfaces.
//!
//! The room engine never talks to the network or disk itself. The async
//! driver calls these traits; tests and the simulation harness provide
//! scripted implementations.

use async_trait::async_trait;
use parlor_proto::{EventId, PaginationChunk, RoomId, TransactionId, UserId};
use serde_json::Value;

use crate::error::{PersistenceError, TransportError};

/// Remote protocol calls.
///
/// `send` must be idempotent per transaction id: repeating a call with the
/// same id yields the same event, never a duplicate.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send a message-like event.
    async fn send(
        &self,
        room_id: &RoomId,
        event_type: &str,
        txn_id: &TransactionId,
        content: &Value,
    ) -> Result<EventId, TransportError>;

    /// Set a state event.
    async fn set_state(
        &self,
        room_id: &RoomId,
        event_type: &str,
        state_key: &str,
        content: &Value,
    ) -> Result<EventId, TransportError>;

    /// Redact an event.
    async fn redact(
        &self,
        room_id: &RoomId,
        event_id: &EventId,
        txn_id: &TransactionId,
        reason: Option<&str>,
    ) -> Result<EventId, TransportError>;

    /// Fetch up to `limit` events older than `token`.
    async fn fetch_older(
        &self,
        room_id: &RoomId,
        token: Option<&str>,
        limit: u32,
    ) -> Result<PaginationChunk, TransportError>;

    /// Leave a room.
    async fn leave(&self, room_id: &RoomId) -> Result<(), TransportError>;

    /// Kick a member.
    async fn kick(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        reason: Option<&str>,
    ) -> Result<(), TransportError>;

    /// Ban a user.
    async fn ban(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        reason: Option<&str>,
    ) -> Result<(), TransportError>;

    /// Invite a user.
    async fn invite(&self, room_id: &RoomId, user_id: &UserId) -> Result<(), TransportError>;
}

/// Durable storage of room snapshots.
///
/// Optional: rooms work memory-only without it.
#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    /// Load the last stored snapshot bytes for a room.
    async fn load(&self, room_id: &RoomId) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Replace the stored snapshot bytes for a room.
    async fn store(&self, room_id: &RoomId, snapshot: &[u8]) -> Result<(), PersistenceError>;
}
