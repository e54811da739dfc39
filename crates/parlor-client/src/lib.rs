//! Parlor client: per-room state machine and its async driver.
//!
//! ## Architecture
//!
//! ```text
//! parlor-client
//!   ├─ Room           (sans-IO: RoomEvent in, RoomAction out)
//!   │   ├─ SendQueue  (pending / superseded / failed sends)
//!   │   └─ Pager      (backward pagination token)
//!   ├─ RoomDriver     (executes actions against Transport and Persistence)
//!   │   └─ SnapshotWriter (per-room task storing the newest snapshot)
//!   ├─ Client         (one driver per room, sync routing, global account data)
//!   ├─ Subscriptions  (broadcast of RoomNotification)
//!   └─ SystemEnv      (production Environment impl)
//! ```
//!
//! The room never performs I/O. Everything it needs from the outside world
//! arrives as a [`RoomEvent`], everything it wants done leaves as a
//! [`RoomAction`]. This keeps the whole engine testable under a virtual
//! clock.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod client;
pub mod collaborators;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod pager;
pub mod room;
pub mod send_queue;
pub mod snapshot;
pub mod subscriptions;
mod system_env;
mod writer;

pub use client::{Client, SyncReport};
pub use collaborators::{Persistence, Transport};
pub use config::{ClientConfig, RoomConfig};
pub use driver::{RoomDriver, Services};
pub use error::{ClientError, PersistenceError, TransportError};
pub use event::{
    PaginationOutcome, RoomAction, RoomEvent, RoomNotification, SendOutcome, TimelineOrigin,
};
pub use pager::{Pager, PagerCheckpoint};
pub use room::Room;
pub use send_queue::{FailedSend, SendQueue};
pub use snapshot::RoomSnapshot;
pub use subscriptions::{Subscription, Subscriptions};
pub use system_env::SystemEnv;
