//! Parlor wire types.
//!
//! Types shared by every layer of the room state engine: identifiers, the raw
//! events delivered by the sync and pagination endpoints, the event-type
//! taxonomy, and the closed union of typed content payloads.
//!
//! # Design
//!
//! Content is decoded exactly once, when an event enters the engine. Unknown
//! or malformed payloads become [`RoomContent::Opaque`] instead of failing, so
//! nothing downstream of decoding ever has to handle a parse error.
//!
//! # Components
//!
//! - [`RawEvent`]: an event as it appears on the wire
//! - [`StateEvent`]: an admitted event with its local ordering key and send
//!   status
//! - [`RoomContent`]: typed payload per event type
//! - [`RoomUpdate`] / [`SyncResponse`] / [`PaginationChunk`]: transport
//!   payload shapes

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod content;
pub mod error;
pub mod event;
pub mod event_type;
pub mod ids;
pub mod sync;

pub use content::{
    AvatarContent, CanonicalAliasContent, CreateContent, EmoteImage, EmotePackContent,
    EmotePackInfo, EncryptedContent, EncryptionContent, GuestAccess, GuestAccessContent,
    HistoryVisibility, HistoryVisibilityContent, InReplyTo, JoinRule, JoinRulesContent,
    MemberContent, Membership, MessageContent, NameContent, PowerLevelsContent, ReactionContent,
    RedactionContent, Relation, RoomContent, TopicContent,
};
pub use error::ProtoError;
pub use event::{EventStatus, OrderingKey, RawEvent, StateEvent};
pub use event_type::EventKind;
pub use ids::{EventId, RoomId, TransactionId, UserId};
pub use sync::{
    BasicEvent, PaginationChunk, RoomSummary, RoomUpdate, SyncResponse, Timeline,
    UnreadNotifications,
};
