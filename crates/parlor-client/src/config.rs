//! Room and client configuration.

use std::time::Duration;

use parlor_proto::{UserId, event_type};

/// Per-room tunables.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Deadline for a send, measured from its first attempt.
    pub send_timeout: Duration,
    /// Fixed wait between attempts of a transiently failing send.
    pub retry_interval: Duration,
    /// Event types eligible as a room preview.
    pub preview_event_types: Vec<String>,
    /// Display name of a room with nothing better to show.
    pub empty_room_label: String,
    /// Seal outgoing content in encrypted rooms.
    pub encryption_enabled: bool,
    /// Largest serialized content accepted for sending.
    pub max_content_bytes: usize,
    /// Notifications buffered per subscriber before the oldest are dropped.
    pub notification_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(60),
            retry_interval: Duration::from_secs(1),
            preview_event_types: vec![
                event_type::MESSAGE.to_owned(),
                event_type::ENCRYPTED.to_owned(),
                event_type::STICKER.to_owned(),
            ],
            empty_room_label: "Empty chat".to_owned(),
            encryption_enabled: true,
            max_content_bytes: 65_536,
            notification_capacity: 256,
        }
    }
}

/// Client-wide configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The local user.
    pub user_id: UserId,
    /// Template for every room the client opens.
    pub room: RoomConfig,
}

impl ClientConfig {
    /// Default room settings for `user_id`.
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, room: RoomConfig::default() }
    }
}
