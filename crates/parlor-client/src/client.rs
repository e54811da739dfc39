//! Multi-room client.
//!
//! [`Client`] owns one [`RoomDriver`] per room, routes each sync response's
//! per-room slices to them and keeps the global account data that derived
//! per-room values need (`m.direct`, push rules, emote sources).
//!
//! Rooms are isolated: an error while applying one room's update is logged
//! and reported, and the remaining rooms are still processed.

use std::collections::BTreeMap;

use parlor_core::{
    EmotePack, Environment, KeyValueStore, NotificationMode, ReferencedPack, emotes, membership,
    push_rules,
};
use parlor_proto::{RoomContent, RoomId, SyncResponse, UserId, event_type};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{
    collaborators::Transport,
    config::ClientConfig,
    driver::{RoomDriver, Services},
    error::ClientError,
};

/// What a sync response changed.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Rooms whose update was applied.
    pub updated: Vec<RoomId>,
    /// Rooms whose update failed, with the error.
    pub failed: Vec<(RoomId, ClientError)>,
    /// Global account data types that changed.
    pub account_data: Vec<String>,
}

/// Client over every room of one user.
pub struct Client<E: Environment, T: Transport> {
    config: ClientConfig,
    env: E,
    services: Services<T>,
    rooms: RwLock<BTreeMap<RoomId, RoomDriver<E, T>>>,
    account_data: RwLock<KeyValueStore>,
    next_batch: RwLock<Option<String>>,
}

impl<E: Environment, T: Transport> Client<E, T> {
    /// Client with no rooms.
    pub fn new(env: E, config: ClientConfig, services: Services<T>) -> Self {
        Self {
            config,
            env,
            services,
            rooms: RwLock::new(BTreeMap::new()),
            account_data: RwLock::new(KeyValueStore::new()),
            next_batch: RwLock::new(None),
        }
    }

    /// The local user.
    pub fn user_id(&self) -> &UserId {
        &self.config.user_id
    }

    /// Driver of a known room.
    pub async fn room(&self, room_id: &RoomId) -> Option<RoomDriver<E, T>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Known room ids, sorted.
    pub async fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().cloned().collect()
    }

    /// Driver of `room_id`, opening (and restoring) it on first use.
    pub async fn open_room(&self, room_id: &RoomId) -> RoomDriver<E, T> {
        if let Some(room) = self.room(room_id).await {
            return room;
        }

        let opened = RoomDriver::open(
            self.env.clone(),
            self.services.clone(),
            room_id.clone(),
            self.config.user_id.clone(),
            self.config.room.clone(),
        )
        .await;

        // Another task may have opened it while we were restoring.
        let mut rooms = self.rooms.write().await;
        rooms.entry(room_id.clone()).or_insert(opened).clone()
    }

    /// Leave a room and forget it locally.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` for unknown rooms; transport failures, in which case
    /// the room is kept.
    pub async fn leave_room(&self, room_id: &RoomId) -> Result<(), ClientError> {
        let room = self
            .room(room_id)
            .await
            .ok_or_else(|| ClientError::RoomNotFound { room_id: room_id.clone() })?;
        room.leave().await?;
        self.rooms.write().await.remove(room_id);
        tracing::info!(%room_id, "room left");
        Ok(())
    }

    /// Token to resume syncing from.
    pub async fn next_batch(&self) -> Option<String> {
        self.next_batch.read().await.clone()
    }

    /// Apply a sync response.
    ///
    /// Global account data is applied first so per-room derived values see
    /// it. Rooms are processed in id order.
    pub async fn handle_sync(&self, response: SyncResponse) -> SyncReport {
        let mut report = SyncReport {
            account_data: self.account_data.write().await.put_all(response.account_data),
            ..SyncReport::default()
        };

        for (room_id, update) in response.rooms {
            let room = self.open_room(&room_id).await;
            match room.sync(update).await {
                Ok(()) => report.updated.push(room_id),
                Err(e) => {
                    tracing::warn!(%room_id, fatal = e.is_fatal(), "room sync failed: {e}");
                    report.failed.push((room_id, e));
                },
            }
        }

        if let Some(next_batch) = response.next_batch {
            *self.next_batch.write().await = Some(next_batch);
        }
        report
    }

    /// Global account data of `event_type`.
    pub async fn account_data(&self, event_type: &str) -> Option<Value> {
        self.account_data.read().await.get(event_type).cloned()
    }

    /// Notification mode of a room, from the push rules.
    pub async fn notification_mode(&self, room_id: &RoomId) -> NotificationMode {
        let rules = self.account_data(event_type::PUSH_RULES).await;
        push_rules::notification_mode(rules.as_ref(), room_id)
    }

    /// Direct-chat partner of a room, if it is a direct chat.
    pub async fn direct_partner(&self, room_id: &RoomId) -> Option<UserId> {
        let room = self.room(room_id).await?;
        let direct = self.account_data(event_type::DIRECT).await;
        room.with_room(|room| {
            membership::direct_chat_partner(room.store(), room.own_user(), direct.as_ref())
        })
        .await
    }

    /// Emote packs usable in a room: the user's own pack, packs of rooms the
    /// user pinned, then the room's own packs. Duplicate images are dropped.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` for unknown rooms.
    pub async fn emote_packs(&self, room_id: &RoomId) -> Result<Vec<EmotePack>, ClientError> {
        let room = self
            .room(room_id)
            .await
            .ok_or_else(|| ClientError::RoomNotFound { room_id: room_id.clone() })?;

        let user_pack = self.account_data(event_type::USER_EMOTES).await.and_then(|content| {
            match RoomContent::decode(event_type::USER_EMOTES, &content) {
                RoomContent::EmotePack(pack) => Some(pack),
                _ => None,
            }
        });

        let mut referenced = Vec::new();
        if let Some(pinned) = self.account_data(event_type::EMOTE_ROOMS).await {
            for (source_room, state_key) in emotes::referenced_rooms(&pinned) {
                let Some(source) = self.room(&source_room).await else {
                    tracing::debug!(room_id = %source_room, "pinned emote room not joined");
                    continue;
                };
                let content = source
                    .with_room(|room| match room.store().get(event_type::ROOM_EMOTES, &state_key) {
                        Some(event) => match event.content() {
                            RoomContent::EmotePack(pack) => Some(pack.clone()),
                            _ => None,
                        },
                        None => None,
                    })
                    .await;
                if let Some(content) = content {
                    referenced.push(ReferencedPack { room_id: source_room, state_key, content });
                }
            }
        }

        Ok(room
            .with_room(|room| emotes::aggregate(user_pack.as_ref(), &referenced, room.store()))
            .await)
    }
}
