//! Parlor core: sans-IO room state engine.
//!
//! Everything in this crate is synchronous and free of I/O. Time and
//! randomness come from an [`Environment`]; decryption comes from an optional
//! [`Crypto`] collaborator. The async driving layer lives in `parlor-client`.
//!
//! # Components
//!
//! - [`SortOrderGenerator`]: forward/backward ordering key allocation
//! - [`StateStore`]: latest event per (type, state key) under the merge rule
//! - [`KeyValueStore`]: replace-on-write account data and ephemeral events
//! - [`Permissions`]: power-level capability checks
//! - [`RoomView`]: derived name, topic, last event and friends
//! - [`emotes`], [`compose`], [`push_rules`]: smaller derived concerns

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod compose;
pub mod crypto;
pub mod emotes;
pub mod env;
pub mod kv_store;
pub mod membership;
pub mod ordering;
pub mod power_levels;
pub mod push_rules;
pub mod state_store;
pub mod view;

pub use crypto::{Crypto, CryptoError};
pub use emotes::{Emote, EmotePack, EmoteSource, ReferencedPack};
pub use env::Environment;
pub use kv_store::KeyValueStore;
pub use membership::MembershipSnapshot;
pub use ordering::{OrderingCheckpoint, SortOrderGenerator};
pub use power_levels::{PowerAction, Permissions};
pub use push_rules::NotificationMode;
pub use state_store::StateStore;
pub use view::RoomView;
