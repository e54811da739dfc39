//! Async room driver.
//!
//! [`RoomDriver`] wraps a [`Room`] behind an async mutex and executes the
//! actions it returns against the collaborators. `Transmit` and `FetchOlder`
//! become transport calls, each transmit racing the send deadline.
//! `ScheduleRetry` becomes an environment sleep and `Notify` is published to
//! subscribers. `Persist` is queued on the room's snapshot writer task.
//!
//! # Locking
//!
//! The room lock is held while an event is handled and its notifications are
//! published, never across a transport or persistence call. Lock order is
//! room, then the cancellation table.

use std::{collections::HashMap, sync::Arc};

use parlor_core::{
    Crypto, Environment, MembershipSnapshot, Permissions, PowerAction, compose, power_levels,
};
use parlor_proto::{
    EventId, GuestAccess, GuestAccessContent, HistoryVisibility, HistoryVisibilityContent,
    JoinRule, JoinRulesContent, MessageContent, NameContent, RoomId, RoomUpdate, StateEvent,
    TopicContent, TransactionId, UserId, event_type,
};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    collaborators::{Persistence, Transport},
    config::RoomConfig,
    error::{ClientError, TransportError},
    event::{PaginationOutcome, RoomAction, RoomEvent, SendOutcome},
    room::Room,
    snapshot::RoomSnapshot,
    subscriptions::{Subscription, Subscriptions},
    writer::SnapshotWriter,
};

/// Collaborators shared by every room of a client.
pub struct Services<T> {
    /// Remote protocol calls.
    pub transport: Arc<T>,
    /// Snapshot storage; rooms are memory-only without it.
    pub persistence: Option<Arc<dyn Persistence>>,
    /// Encryption; encrypted rooms send plaintext without it.
    pub crypto: Option<Arc<dyn Crypto>>,
}

impl<T> Services<T> {
    /// Transport only.
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport, persistence: None, crypto: None }
    }

    /// Add snapshot storage.
    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Add encryption.
    #[must_use]
    pub fn with_crypto(mut self, crypto: Arc<dyn Crypto>) -> Self {
        self.crypto = Some(crypto);
        self
    }
}

impl<T> Clone for Services<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            persistence: self.persistence.clone(),
            crypto: self.crypto.clone(),
        }
    }
}

/// Async front of one room.
///
/// Cheap to clone; clones share the room.
pub struct RoomDriver<E: Environment, T: Transport> {
    room_id: RoomId,
    room: Arc<Mutex<Room<E>>>,
    env: E,
    services: Services<T>,
    subscriptions: Subscriptions,
    cancellations: Arc<Mutex<HashMap<TransactionId, CancellationToken>>>,
    writer: Option<Arc<SnapshotWriter>>,
}

impl<E: Environment, T: Transport> Clone for RoomDriver<E, T> {
    fn clone(&self) -> Self {
        Self {
            room_id: self.room_id.clone(),
            room: Arc::clone(&self.room),
            env: self.env.clone(),
            services: self.services.clone(),
            subscriptions: self.subscriptions.clone(),
            cancellations: Arc::clone(&self.cancellations),
            writer: self.writer.clone(),
        }
    }
}

impl<E: Environment, T: Transport> RoomDriver<E, T> {
    /// Open a room, restoring its snapshot when persistence has one.
    ///
    /// Unreadable snapshots are logged and the room starts empty.
    pub async fn open(
        env: E,
        services: Services<T>,
        room_id: RoomId,
        own_user: UserId,
        config: RoomConfig,
    ) -> Self {
        let subscriptions = Subscriptions::new(config.notification_capacity);
        let snapshot = match &services.persistence {
            Some(persistence) => load_snapshot(persistence.as_ref(), &room_id).await,
            None => None,
        };

        let room = match snapshot {
            Some(snapshot) => Room::restore(env.clone(), snapshot, own_user, config),
            None => Room::new(env.clone(), room_id.clone(), own_user, config),
        };
        let room = match &services.crypto {
            Some(crypto) => room.with_crypto(Arc::clone(crypto)),
            None => room,
        };
        let writer = services.persistence.as_ref().map(|persistence| {
            Arc::new(SnapshotWriter::spawn(Arc::clone(persistence), room_id.clone()))
        });

        Self {
            room_id,
            room: Arc::new(Mutex::new(room)),
            env,
            services,
            subscriptions,
            cancellations: Arc::new(Mutex::new(HashMap::new())),
            writer,
        }
    }

    /// Room id.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Subscribe to this room's notifications.
    pub fn subscribe(&self) -> Subscription {
        self.subscriptions.subscribe()
    }

    /// Run `f` against the room under its lock.
    pub async fn with_room<R>(&self, f: impl FnOnce(&Room<E>) -> R) -> R {
        let room = self.room.lock().await;
        f(&room)
    }

    /// Display name.
    pub async fn display_name(&self) -> String {
        self.with_room(Room::display_name).await
    }

    /// Preview event.
    pub async fn last_event(&self) -> Option<StateEvent> {
        self.with_room(|room| room.last_event().cloned()).await
    }

    /// Users currently typing.
    pub async fn typing_users(&self) -> Vec<UserId> {
        self.with_room(Room::typing_users).await
    }

    /// Members and counts.
    pub async fn membership(&self) -> MembershipSnapshot {
        self.with_room(|room| room.view().membership_snapshot()).await
    }

    /// Whether the local user may send `event_type`.
    pub async fn can_send(&self, event_type: &str) -> bool {
        self.with_room(|room| room.can_send(event_type)).await
    }

    /// Whether the local user may set state of `event_type`.
    pub async fn can_send_state(&self, event_type: &str) -> bool {
        self.with_room(|room| room.can_send_state(event_type)).await
    }

    /// Whether the local user may perform a moderation action.
    pub async fn can_perform(&self, action: PowerAction) -> bool {
        self.with_room(|room| room.can_perform(action)).await
    }

    /// Current persistable state.
    pub async fn snapshot(&self) -> RoomSnapshot {
        self.with_room(Room::snapshot).await
    }

    /// Wait until every snapshot produced so far has been handed to
    /// persistence. Returns at once for memory-only rooms.
    ///
    /// Never returns if the persistence collaborator hangs.
    pub async fn flush(&self) {
        if let Some(writer) = &self.writer {
            writer.flush().await;
        }
    }

    /// Apply this room's slice of a sync response.
    ///
    /// # Errors
    ///
    /// Only if the room rejects the update, which ingestion never does today.
    pub async fn sync(&self, update: RoomUpdate) -> Result<(), ClientError> {
        let control = self.apply(RoomEvent::Sync(update)).await?;
        debug_assert!(control.is_empty());
        Ok(())
    }

    /// Send an event and wait for its terminal outcome.
    ///
    /// The echo is visible to subscribers before this returns. Transient
    /// failures are retried until the send deadline.
    ///
    /// # Errors
    ///
    /// - Local validation: `InvalidContent`, `ContentTooLarge`,
    ///   `PermissionDenied`; no echo is created
    /// - `SendFailed` once the deadline passes or on a terminal rejection
    /// - `SendCancelled` if [`cancel_send`](Self::cancel_send) or
    ///   [`reset`](Self::reset) won the race
    pub async fn send(
        &self,
        event_type: &str,
        content: Value,
        txn_id: Option<TransactionId>,
    ) -> Result<EventId, ClientError> {
        let event =
            RoomEvent::Send { event_type: event_type.to_owned(), content, txn_id: txn_id.clone() };
        let control = self.apply(event).await?;
        self.drive_send(control, txn_id).await
    }

    /// Send an `m.room.message`.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_message(&self, content: MessageContent) -> Result<EventId, ClientError> {
        self.send(event_type::MESSAGE, to_content(&content)?, None).await
    }

    /// Send `content` as a reply to `target`, with quoted fallback.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn reply(
        &self,
        content: MessageContent,
        target: &StateEvent,
    ) -> Result<EventId, ClientError> {
        self.send_message(compose::reply(content, &self.room_id, target)).await
    }

    /// Replace the content of `target`.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn edit(
        &self,
        content: MessageContent,
        target: &EventId,
    ) -> Result<EventId, ClientError> {
        self.send_message(compose::edit(content, target)).await
    }

    /// React to `target` with `key`.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn react(&self, target: &EventId, key: &str) -> Result<EventId, ClientError> {
        let content = to_content(&compose::reaction(target, key))?;
        self.send(event_type::REACTION, content, None).await
    }

    /// Redact an event.
    ///
    /// Redacting another user's event needs the redact level when that event
    /// is resident; other targets are left to the server to judge.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` or transport failures.
    pub async fn redact(
        &self,
        event_id: &EventId,
        reason: Option<&str>,
    ) -> Result<EventId, ClientError> {
        let txn_id = {
            let mut room = self.room.lock().await;
            let own = room.own_user();
            let foreign = room
                .store()
                .iter()
                .any(|event| event.event_id() == event_id && event.sender() != own);
            if foreign && !room.view().permissions().can_redact(own) {
                return Err(denied(PowerAction::Redact.as_str()));
            }
            room.mint_txn_id()
        };
        let redaction =
            self.services.transport.redact(&self.room_id, event_id, &txn_id, reason).await?;
        tracing::debug!(room_id = %self.room_id, %event_id, "redaction sent");
        Ok(redaction)
    }

    /// Resend a failed send under a new transaction id.
    ///
    /// # Errors
    ///
    /// `UnknownTransaction` if `txn_id` is not a failed send, then as
    /// [`send`](Self::send).
    pub async fn resend(&self, txn_id: &TransactionId) -> Result<EventId, ClientError> {
        let control = self.apply(RoomEvent::Resend { txn_id: txn_id.clone() }).await?;
        self.drive_send(control, None).await
    }

    /// Abandon a send. Its waiting caller gets `SendCancelled`.
    ///
    /// # Errors
    ///
    /// Never fails for unknown transactions; they are already settled.
    pub async fn cancel_send(&self, txn_id: &TransactionId) -> Result<(), ClientError> {
        let mut room = self.room.lock().await;
        if let Some(token) = self.cancellations.lock().await.get(txn_id) {
            token.cancel();
            return Ok(());
        }
        let actions = room.handle(RoomEvent::CancelSend { txn_id: txn_id.clone() })?;
        self.dispatch(actions);
        Ok(())
    }

    /// Fetch one page of older history.
    ///
    /// # Errors
    ///
    /// `PaginationInFlight` if another request is running; transport
    /// failures, which leave the pagination token unchanged.
    pub async fn request_older(&self, limit: u32) -> Result<PaginationOutcome, ClientError> {
        let control = self.apply(RoomEvent::PaginationRequested { limit }).await?;
        for action in control {
            match action {
                RoomAction::PaginationSettled { outcome, .. } => return Ok(outcome),
                RoomAction::FetchOlder { request_id, token, limit } => {
                    let fetched = self
                        .services
                        .transport
                        .fetch_older(&self.room_id, token.as_deref(), limit)
                        .await;
                    let chunk = match fetched {
                        Ok(chunk) => chunk,
                        Err(error) => {
                            tracing::warn!(room_id = %self.room_id, "pagination failed: {error}");
                            self.apply(RoomEvent::PaginationFailed { request_id }).await?;
                            return Err(error.into());
                        },
                    };
                    let control =
                        self.apply(RoomEvent::PaginationResponse { request_id, chunk }).await?;
                    return pagination_outcome(control);
                },
                other => tracing::debug!(?other, "unexpected pagination action"),
            }
        }
        Err(ClientError::InvalidState { reason: "pagination produced no outcome".to_owned() })
    }

    /// Drop all local state. Running sends settle as cancelled.
    ///
    /// # Errors
    ///
    /// Only if the room rejects the reset, which it never does today.
    pub async fn reset(&self) -> Result<(), ClientError> {
        let mut room = self.room.lock().await;
        for (_, token) in self.cancellations.lock().await.drain() {
            token.cancel();
        }
        let actions = room.handle(RoomEvent::Reset)?;
        self.dispatch(actions);
        Ok(())
    }

    /// Set the room name.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` or transport failures.
    pub async fn set_name(&self, name: &str) -> Result<EventId, ClientError> {
        self.put_state(event_type::NAME, &NameContent { name: name.to_owned() }).await
    }

    /// Set the room topic.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` or transport failures.
    pub async fn set_topic(&self, topic: &str) -> Result<EventId, ClientError> {
        self.put_state(event_type::TOPIC, &TopicContent { topic: topic.to_owned() }).await
    }

    /// Set the join rule.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` or transport failures.
    pub async fn set_join_rule(&self, join_rule: JoinRule) -> Result<EventId, ClientError> {
        self.put_state(event_type::JOIN_RULES, &JoinRulesContent { join_rule }).await
    }

    /// Set guest access.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` or transport failures.
    pub async fn set_guest_access(
        &self,
        guest_access: GuestAccess,
    ) -> Result<EventId, ClientError> {
        self.put_state(event_type::GUEST_ACCESS, &GuestAccessContent { guest_access }).await
    }

    /// Set history visibility.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` or transport failures.
    pub async fn set_history_visibility(
        &self,
        history_visibility: HistoryVisibility,
    ) -> Result<EventId, ClientError> {
        let content = HistoryVisibilityContent { history_visibility };
        self.put_state(event_type::HISTORY_VISIBILITY, &content).await
    }

    /// Set `user_id`'s power level.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` unless the local user may grant `level` to
    /// `user_id`; transport failures.
    pub async fn set_power_level(
        &self,
        user_id: &UserId,
        level: i64,
    ) -> Result<EventId, ClientError> {
        let (allowed, next) = self
            .with_room(|room| {
                let permissions = room.view().permissions();
                (
                    permissions.can_change_power_level(room.own_user(), user_id, level),
                    power_levels::with_user_level(permissions.levels(), user_id, level),
                )
            })
            .await;
        if !allowed {
            return Err(denied(event_type::POWER_LEVELS));
        }
        self.put_state(event_type::POWER_LEVELS, &next).await
    }

    /// Leave the room. Leaving a room the server no longer knows succeeds.
    ///
    /// # Errors
    ///
    /// Transport failures other than `NotFound`.
    pub async fn leave(&self) -> Result<(), ClientError> {
        match self.services.transport.leave(&self.room_id).await {
            Ok(()) | Err(TransportError::NotFound) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    /// Kick a member. Kicking someone already gone succeeds.
    ///
    /// # Errors
    ///
    /// `PermissionDenied`; transport failures other than `NotFound`.
    pub async fn kick(&self, user_id: &UserId, reason: Option<&str>) -> Result<(), ClientError> {
        self.ensure(PowerAction::Kick, |permissions, own| permissions.can_kick(own)).await?;
        match self.services.transport.kick(&self.room_id, user_id, reason).await {
            Ok(()) | Err(TransportError::NotFound) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    /// Ban a user.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` or transport failures.
    pub async fn ban(&self, user_id: &UserId, reason: Option<&str>) -> Result<(), ClientError> {
        self.ensure(PowerAction::Ban, |permissions, own| permissions.can_ban(own)).await?;
        Ok(self.services.transport.ban(&self.room_id, user_id, reason).await?)
    }

    /// Invite a user.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` or transport failures.
    pub async fn invite(&self, user_id: &UserId) -> Result<(), ClientError> {
        self.ensure(PowerAction::Invite, |permissions, own| permissions.can_invite(own)).await?;
        Ok(self.services.transport.invite(&self.room_id, user_id).await?)
    }

    async fn ensure(
        &self,
        action: PowerAction,
        check: impl FnOnce(&Permissions<'_>, &UserId) -> bool,
    ) -> Result<(), ClientError> {
        let allowed =
            self.with_room(|room| check(&room.view().permissions(), room.own_user())).await;
        if allowed { Ok(()) } else { Err(denied(action.as_str())) }
    }

    async fn put_state<C: Serialize>(
        &self,
        event_type: &str,
        content: &C,
    ) -> Result<EventId, ClientError> {
        if !self.can_send_state(event_type).await {
            return Err(denied(event_type));
        }
        let content = to_content(content)?;
        let event_id =
            self.services.transport.set_state(&self.room_id, event_type, "", &content).await?;
        tracing::debug!(room_id = %self.room_id, event_type, %event_id, "state set");
        Ok(event_id)
    }

    /// Handle an event under the room lock and dispatch its side effects.
    ///
    /// Returns the actions the caller must drive. Every `Transmit` gets a
    /// cancellation token before the lock is released.
    async fn apply(&self, event: RoomEvent) -> Result<Vec<RoomAction>, ClientError> {
        let mut room = self.room.lock().await;
        let actions = room.handle(event)?;
        let control = self.dispatch(actions);

        let mut cancellations = self.cancellations.lock().await;
        for action in &control {
            if let RoomAction::Transmit { txn_id, .. } = action {
                cancellations.entry(txn_id.clone()).or_insert_with(CancellationToken::new);
            }
        }
        drop(cancellations);
        drop(room);
        Ok(control)
    }

    /// Publish notifications and queue snapshots, return the rest.
    fn dispatch(&self, actions: Vec<RoomAction>) -> Vec<RoomAction> {
        let mut control = Vec::new();
        for action in actions {
            match action {
                RoomAction::Notify(notification) => self.subscriptions.publish(notification),
                RoomAction::Persist(snapshot) => self.persist(&snapshot),
                other => control.push(other),
            }
        }
        control
    }

    fn persist(&self, snapshot: &RoomSnapshot) {
        let Some(writer) = &self.writer else {
            return;
        };
        match snapshot.encode() {
            Ok(bytes) => writer.submit(bytes),
            Err(e) => tracing::warn!(room_id = %self.room_id, "snapshot encode failed: {e}"),
        }
    }

    async fn cancellation(&self, txn_id: &TransactionId) -> CancellationToken {
        self.cancellations.lock().await.entry(txn_id.clone()).or_default().clone()
    }

    /// Run transport calls and retry waits until the send settles.
    async fn drive_send(
        &self,
        mut control: Vec<RoomAction>,
        mut txn_hint: Option<TransactionId>,
    ) -> Result<EventId, ClientError> {
        loop {
            let mut next = None;
            for action in control {
                match action {
                    RoomAction::SendSettled { txn_id, outcome } => {
                        self.cancellations.lock().await.remove(&txn_id);
                        return settle(txn_id, outcome);
                    },
                    RoomAction::Transmit { txn_id, event_type, content } => {
                        let token = self.cancellation(&txn_id).await;
                        let deadline = self.with_room(|room| room.send_deadline(&txn_id)).await;
                        let attempt = self.services.transport.send(
                            &self.room_id,
                            &event_type,
                            &txn_id,
                            &content,
                        );
                        let timeout = async {
                            match deadline {
                                Some(at) => self.env.sleep_until(at).await,
                                None => std::future::pending().await,
                            }
                        };
                        next = Some(tokio::select! {
                            biased;
                            () = token.cancelled() => {
                                RoomEvent::CancelSend { txn_id: txn_id.clone() }
                            },
                            result = attempt => match result {
                                Ok(event_id) => {
                                    RoomEvent::SendSucceeded { txn_id: txn_id.clone(), event_id }
                                },
                                Err(error) => {
                                    RoomEvent::SendFailed { txn_id: txn_id.clone(), error }
                                },
                            },
                            () = timeout => {
                                tracing::warn!(
                                    room_id = %self.room_id,
                                    txn_id = %txn_id,
                                    "send attempt outlived the deadline"
                                );
                                RoomEvent::SendTimedOut { txn_id: txn_id.clone() }
                            },
                        });
                        txn_hint = Some(txn_id);
                    },
                    RoomAction::ScheduleRetry { txn_id, delay } => {
                        let token = self.cancellation(&txn_id).await;
                        let wait = self.env.sleep(delay);
                        next = Some(tokio::select! {
                            biased;
                            () = token.cancelled() => {
                                RoomEvent::CancelSend { txn_id: txn_id.clone() }
                            },
                            () = wait => RoomEvent::RetryDue { txn_id: txn_id.clone() },
                        });
                        txn_hint = Some(txn_id);
                    },
                    other => tracing::debug!(?other, "unexpected send action"),
                }
            }

            let Some(event) = next else {
                // Settled elsewhere, or a duplicate of a send already running.
                return Err(match txn_hint {
                    Some(txn_id) => ClientError::SendCancelled { txn_id },
                    None => ClientError::InvalidState {
                        reason: "send produced no outcome".to_owned(),
                    },
                });
            };
            control = self.apply(event).await?;
        }
    }
}

async fn load_snapshot(persistence: &dyn Persistence, room_id: &RoomId) -> Option<RoomSnapshot> {
    let bytes = match persistence.load(room_id).await {
        Ok(bytes) => bytes?,
        Err(e) => {
            tracing::warn!(%room_id, "snapshot load failed, starting empty: {e}");
            return None;
        },
    };
    match RoomSnapshot::decode(&bytes) {
        Ok(snapshot) if &snapshot.room_id == room_id => Some(snapshot),
        Ok(snapshot) => {
            tracing::warn!(
                %room_id,
                found = %snapshot.room_id,
                "snapshot for another room ignored"
            );
            None
        },
        Err(e) => {
            tracing::warn!(%room_id, "snapshot unreadable, starting empty: {e}");
            None
        },
    }
}

fn settle(txn_id: TransactionId, outcome: SendOutcome) -> Result<EventId, ClientError> {
    match outcome {
        SendOutcome::Sent(event_id) => Ok(event_id),
        SendOutcome::Failed { reason } => Err(ClientError::SendFailed { txn_id, reason }),
        SendOutcome::Cancelled => Err(ClientError::SendCancelled { txn_id }),
    }
}

fn pagination_outcome(control: Vec<RoomAction>) -> Result<PaginationOutcome, ClientError> {
    control
        .into_iter()
        .find_map(|action| match action {
            RoomAction::PaginationSettled { outcome, .. } => Some(outcome),
            _ => None,
        })
        .ok_or_else(|| ClientError::InvalidState {
            reason: "pagination response produced no outcome".to_owned(),
        })
}

fn to_content<C: Serialize>(content: &C) -> Result<Value, ClientError> {
    serde_json::to_value(content).map_err(|e| ClientError::InvalidContent { reason: e.to_string() })
}

fn denied(event_type: &str) -> ClientError {
    ClientError::PermissionDenied { event_type: event_type.to_owned() }
}
