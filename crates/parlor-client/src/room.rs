//! Per-room state machine.
//!
//! [`Room`] owns everything the engine knows about one room: the state
//! store, the ordering generator, account data and ephemeral stores, the send
//! queue and the pager. It is driven by [`RoomEvent`]s and answers with
//! [`RoomAction`]s; it never awaits, sleeps or touches the network.
//!
//! # Send lifecycle
//!
//! ```text
//! Send ──► echo (Sending) ──► Transmit
//!                               │
//!             ┌─────────────────┼──────────────────┐
//!             ▼                 ▼                  ▼
//!      SendSucceeded      SendFailed         sync carries txn id
//!      echo → Sent        transient and      echo → Synced at the
//!                         within deadline?   echo's ordering key
//!                         yes: ScheduleRetry
//!                         no:  echo → Failed
//! ```
//!
//! An attempt still unanswered at the deadline arrives as `SendTimedOut` and
//! fails the echo the same way.
//!
//! The echo's ordering key is allocated once, when the echo is synthesized,
//! so concurrent sends keep the order the user issued them in.

use std::sync::Arc;

use parlor_core::{
    Crypto, Environment, KeyValueStore, OrderingCheckpoint, PowerAction, RoomView,
    SortOrderGenerator, StateStore,
};
use parlor_proto::{
    EventId, EventKind, EventStatus, PaginationChunk, RawEvent, RoomId, RoomSummary, RoomUpdate,
    StateEvent, TransactionId, UnreadNotifications, UserId, event_type,
};
use serde_json::Value;

use crate::{
    config::RoomConfig,
    error::{ClientError, TransportError},
    event::{
        PaginationOutcome, RoomAction, RoomEvent, RoomNotification, SendOutcome, TimelineOrigin,
    },
    pager::{Pager, PagerStart},
    send_queue::{FailedSend, PendingSend, SendPhase, SendQueue},
    snapshot::RoomSnapshot,
};

/// Room state machine.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time/randomness
pub struct Room<E: Environment> {
    room_id: RoomId,
    own_user: UserId,
    config: RoomConfig,
    env: E,
    crypto: Option<Arc<dyn Crypto>>,
    ordering: SortOrderGenerator,
    store: StateStore,
    account_data: KeyValueStore,
    ephemeral: KeyValueStore,
    summary: RoomSummary,
    unread: UnreadNotifications,
    sends: SendQueue<E::Instant>,
    pager: Pager,
}

impl<E: Environment> Room<E> {
    /// Create an empty room.
    pub fn new(env: E, room_id: RoomId, own_user: UserId, config: RoomConfig) -> Self {
        let sends = SendQueue::new(env.random_u64());
        Self {
            store: StateStore::new(room_id.clone()),
            room_id,
            own_user,
            config,
            env,
            crypto: None,
            ordering: SortOrderGenerator::new(),
            account_data: KeyValueStore::new(),
            ephemeral: KeyValueStore::new(),
            summary: RoomSummary::default(),
            unread: UnreadNotifications::default(),
            sends,
            pager: Pager::new(),
        }
    }

    /// Rebuild a room from a snapshot.
    ///
    /// Echoes still marked `Sending` are restored as `Failed`, since their
    /// attempts did not survive; they can be resent manually.
    pub fn restore(env: E, snapshot: RoomSnapshot, own_user: UserId, config: RoomConfig) -> Self {
        let mut room = Self::new(env, snapshot.room_id, own_user, config);

        for event in snapshot.events {
            let event = if event.status() == EventStatus::Sending {
                if let Some(txn_id) = event.transaction_id() {
                    room.sends
                        .insert_failed(txn_id, FailedSend::from_echo(&event, "interrupted"));
                }
                event.with_new_status(EventStatus::Failed)
            } else {
                event
            };
            room.store.apply(event, None);
        }

        let newest = room.store.max_ordering_key().map_or(0, |key| key.value());
        room.ordering = SortOrderGenerator::restore(OrderingCheckpoint {
            last_forward: snapshot.ordering.last_forward.max(newest),
            last_backward: snapshot.ordering.last_backward,
        });
        room.pager = Pager::restore(snapshot.pager);
        room.account_data = snapshot.account_data;
        room.summary = snapshot.summary;

        tracing::debug!(room_id = %room.room_id, events = room.store.len(), "room restored");
        room
    }

    /// Attach an encryption collaborator.
    #[must_use]
    pub fn with_crypto(mut self, crypto: Arc<dyn Crypto>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Room id.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Local user.
    pub fn own_user(&self) -> &UserId {
        &self.own_user
    }

    /// Room configuration.
    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    /// Resident state.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Room account data.
    pub fn account_data(&self) -> &KeyValueStore {
        &self.account_data
    }

    /// Ephemeral data.
    pub fn ephemeral(&self) -> &KeyValueStore {
        &self.ephemeral
    }

    /// Summary hints.
    pub fn summary(&self) -> &RoomSummary {
        &self.summary
    }

    /// Server-side unread counts.
    pub fn unread_notifications(&self) -> UnreadNotifications {
        self.unread
    }

    /// Current backward pagination token.
    pub fn pagination_token(&self) -> Option<&str> {
        self.pager.token()
    }

    /// Whether older history is exhausted.
    pub fn is_history_exhausted(&self) -> bool {
        self.pager.is_exhausted()
    }

    /// Whether a pagination request is running.
    pub fn is_paginating(&self) -> bool {
        self.pager.in_flight().is_some()
    }

    /// Number of sends awaiting confirmation.
    pub fn pending_sends(&self) -> usize {
        self.sends.pending_len()
    }

    /// When a running send gives up, measured from its first attempt.
    pub fn send_deadline(&self, txn_id: &TransactionId) -> Option<E::Instant> {
        self.sends.pending(txn_id).map(|pending| pending.started + self.config.send_timeout)
    }

    /// Failed send available for manual resend.
    pub fn failed_send(&self, txn_id: &TransactionId) -> Option<&FailedSend> {
        self.sends.failed(txn_id)
    }

    /// Fresh transaction id for a request outside the send queue, e.g. a
    /// redaction.
    pub fn mint_txn_id(&mut self) -> TransactionId {
        self.sends.mint_txn_id()
    }

    /// Derived view over the resident state.
    pub fn view(&self) -> RoomView<'_> {
        RoomView::new(&self.store, &self.own_user, &self.summary)
    }

    /// Display name, with the configured empty-room label as last resort.
    pub fn display_name(&self) -> String {
        self.view().display_name(&self.config.empty_room_label)
    }

    /// Preview event.
    pub fn last_event(&self) -> Option<&StateEvent> {
        self.view().last_event(&self.config.preview_event_types)
    }

    /// Users currently typing.
    pub fn typing_users(&self) -> Vec<UserId> {
        self.ephemeral.typing_users()
    }

    /// Whether the local user may send `event_type`.
    pub fn can_send(&self, event_type: &str) -> bool {
        self.view().can_send(event_type)
    }

    /// Whether the local user may set state of `event_type`.
    pub fn can_send_state(&self, event_type: &str) -> bool {
        self.view().can_send_state(event_type)
    }

    /// Whether the local user may perform a moderation action.
    pub fn can_perform(&self, action: PowerAction) -> bool {
        self.view().permissions().can_perform(&self.own_user, action)
    }

    /// Current persistable state.
    pub fn snapshot(&self) -> RoomSnapshot {
        let mut events: Vec<_> = self.store.iter().cloned().collect();
        events.sort_by_key(StateEvent::ordering_key);
        RoomSnapshot {
            room_id: self.room_id.clone(),
            events,
            ordering: self.ordering.checkpoint(),
            pager: self.pager.checkpoint(),
            account_data: self.account_data.clone(),
            summary: self.summary.clone(),
        }
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Local validation failures of a send, a second concurrent pagination
    /// request, and operations on unknown transactions.
    pub fn handle(&mut self, event: RoomEvent) -> Result<Vec<RoomAction>, ClientError> {
        match event {
            RoomEvent::Sync(update) => Ok(self.handle_sync(update)),
            RoomEvent::Send { event_type, content, txn_id } => {
                self.handle_send(event_type, content, txn_id)
            },
            RoomEvent::SendSucceeded { txn_id, event_id } => {
                Ok(self.handle_send_succeeded(&txn_id, event_id))
            },
            RoomEvent::SendFailed { txn_id, error } => Ok(self.handle_send_failed(&txn_id, &error)),
            RoomEvent::SendTimedOut { txn_id } => Ok(self.handle_send_timed_out(&txn_id)),
            RoomEvent::RetryDue { txn_id } => Ok(self.handle_retry_due(&txn_id)),
            RoomEvent::CancelSend { txn_id } => Ok(self.handle_cancel(&txn_id)),
            RoomEvent::Resend { txn_id } => self.handle_resend(&txn_id),
            RoomEvent::PaginationRequested { limit } => self.handle_pagination_requested(limit),
            RoomEvent::PaginationResponse { request_id, chunk } => {
                Ok(self.handle_pagination_response(request_id, chunk))
            },
            RoomEvent::PaginationFailed { request_id } => {
                self.pager.abort(request_id);
                Ok(Vec::new())
            },
            RoomEvent::Reset => Ok(self.handle_reset()),
        }
    }

    fn admit(&mut self, event: StateEvent) -> bool {
        self.store.apply(event, self.crypto.as_deref())
    }

    fn notify(&self, notification: RoomNotification) -> RoomAction {
        RoomAction::Notify(notification)
    }

    fn state_changed(&self) -> RoomAction {
        self.notify(RoomNotification::StateChanged { room_id: self.room_id.clone() })
    }

    fn persist(&self) -> RoomAction {
        RoomAction::Persist(Box::new(self.snapshot()))
    }

    fn handle_sync(&mut self, update: RoomUpdate) -> Vec<RoomAction> {
        let mut actions = Vec::new();
        let mut changed = false;

        if let Some(summary) = update.summary {
            let before = self.summary.clone();
            self.summary.merge(summary);
            changed |= before != self.summary;
        }
        if let Some(unread) = update.unread_notifications {
            self.unread = unread;
        }

        for raw in update.state {
            let key = self.ordering.next_forward_key(self.env.wall_clock_millis());
            changed |= self.admit(StateEvent::new(raw, key));
        }

        let mut timeline = Vec::new();
        for raw in update.timeline.events {
            if let Some(updated) = self.confirm_from_sync(&raw) {
                changed = true;
                actions.push(updated);
                continue;
            }
            let key = self.ordering.next_forward_key(self.env.wall_clock_millis());
            let event = StateEvent::new(raw, key);
            changed |= self.admit(event.clone());
            timeline.push(event);
        }
        self.pager.observe_sync(update.timeline.prev_batch.as_deref(), update.timeline.limited);

        if !timeline.is_empty() {
            actions.push(self.notify(RoomNotification::Timeline {
                room_id: self.room_id.clone(),
                events: timeline,
                origin: TimelineOrigin::Live,
            }));
        }

        let ephemeral = self.ephemeral.put_all(update.ephemeral);
        if !ephemeral.is_empty() {
            actions.push(self.notify(RoomNotification::EphemeralChanged {
                room_id: self.room_id.clone(),
                types: ephemeral,
            }));
        }

        let account_data = self.account_data.put_all(update.account_data);
        if !account_data.is_empty() {
            changed = true;
            actions.push(self.notify(RoomNotification::AccountDataChanged {
                room_id: self.room_id.clone(),
                types: account_data,
            }));
        }

        if changed {
            actions.push(self.state_changed());
            actions.push(self.persist());
        }
        actions
    }

    /// Replace a pending echo with its synced copy at the echo's key.
    fn confirm_from_sync(&mut self, raw: &RawEvent) -> Option<RoomAction> {
        let txn_id = raw.transaction_id()?;
        let pending = self.sends.confirm_by_sync(&txn_id, &raw.event_id)?;

        let synced = StateEvent::new(raw.clone(), pending.echo.ordering_key());
        let synced = self.store.prepare(synced.clone(), self.crypto.as_deref()).unwrap_or(synced);
        if self.store.update_echo(&txn_id, |_| synced.clone()).is_none() {
            self.admit(synced.clone());
        }

        tracing::debug!(
            room_id = %self.room_id,
            txn_id = %txn_id,
            event_id = %raw.event_id,
            "echo confirmed by sync"
        );
        Some(self.notify(RoomNotification::EventUpdated {
            room_id: self.room_id.clone(),
            txn_id,
            event: synced,
        }))
    }

    fn validate(&self, event_type: &str, content: &Value) -> Result<(), ClientError> {
        if EventKind::classify(event_type, false) == EventKind::State {
            return Err(ClientError::InvalidContent {
                reason: format!("{event_type} is a state event type"),
            });
        }

        if event_type == event_type::MESSAGE {
            let body = content.get("body").and_then(Value::as_str).unwrap_or_default();
            if body.trim().is_empty() {
                return Err(ClientError::InvalidContent { reason: "empty body".to_owned() });
            }
        }

        let size = serde_json::to_vec(content)
            .map_err(|e| ClientError::InvalidContent { reason: e.to_string() })?
            .len();
        if size > self.config.max_content_bytes {
            return Err(ClientError::ContentTooLarge { size, max: self.config.max_content_bytes });
        }

        if !self.can_send(event_type) {
            return Err(ClientError::PermissionDenied { event_type: event_type.to_owned() });
        }
        Ok(())
    }

    fn handle_send(
        &mut self,
        event_type: String,
        content: Value,
        txn_id: Option<TransactionId>,
    ) -> Result<Vec<RoomAction>, ClientError> {
        self.validate(&event_type, &content)?;

        let txn_id = match txn_id {
            Some(txn_id) if self.sends.is_known(&txn_id) => {
                tracing::debug!(txn_id = %txn_id, "duplicate send ignored");
                return Ok(Vec::new());
            },
            Some(txn_id) => txn_id,
            None => self.sends.mint_txn_id(),
        };

        let wall = self.env.wall_clock_millis();
        let key = self.ordering.next_forward_key(wall);
        let raw = RawEvent::new(
            event_type,
            None,
            self.own_user.clone(),
            EventId::local_echo(&txn_id),
            wall,
            content,
        )
        .with_transaction_id(&txn_id);
        let echo = StateEvent::with_status(raw, key, EventStatus::Sending);

        let admitted = self.admit(echo.clone());
        self.sends.insert(
            txn_id.clone(),
            PendingSend {
                echo: echo.clone(),
                wire: None,
                started: self.env.now(),
                phase: SendPhase::Sending,
            },
        );
        tracing::debug!(
            room_id = %self.room_id,
            txn_id = %txn_id,
            ordering_key = %key,
            "echo synthesized"
        );

        let mut actions = vec![self.notify(RoomNotification::Timeline {
            room_id: self.room_id.clone(),
            events: vec![echo],
            origin: TimelineOrigin::Live,
        })];
        if admitted {
            actions.push(self.state_changed());
        }
        actions.extend(self.transmit(&txn_id));
        Ok(actions)
    }

    /// Transmit (or retransmit) a pending send, sealing it on first use.
    fn transmit(&mut self, txn_id: &TransactionId) -> Vec<RoomAction> {
        let Some(pending) = self.sends.pending(txn_id) else {
            return Vec::new();
        };

        let sealed = match &pending.wire {
            Some(wire) => Ok(wire.clone()),
            None => self.seal(pending.echo.event_type(), pending.echo.raw_content()),
        };
        let wire = match sealed {
            Ok(wire) => wire,
            Err(reason) => {
                let outcome = SendOutcome::Failed { reason: reason.clone() };
                return self.fail_send(txn_id, &reason, outcome);
            },
        };

        if let Some(pending) = self.sends.pending_mut(txn_id) {
            pending.wire = Some(wire.clone());
        }
        let (event_type, content) = wire;
        vec![RoomAction::Transmit { txn_id: txn_id.clone(), event_type, content }]
    }

    /// Wire payload: sealed when the room is encrypted and encryption is on.
    fn seal(&self, event_type: &str, content: &Value) -> Result<(String, Value), String> {
        let plain = || Ok((event_type.to_owned(), content.clone()));
        if !self.config.encryption_enabled || !self.view().is_encrypted() {
            return plain();
        }
        let Some(crypto) = &self.crypto else {
            tracing::warn!(
                room_id = %self.room_id,
                "encrypted room without encryption support, sending plaintext"
            );
            return plain();
        };
        crypto
            .encrypt(&self.room_id, event_type, content)
            .map(|envelope| (event_type::ENCRYPTED.to_owned(), envelope))
            .map_err(|e| format!("encryption failed: {e}"))
    }

    fn handle_send_succeeded(
        &mut self,
        txn_id: &TransactionId,
        event_id: EventId,
    ) -> Vec<RoomAction> {
        if let Some(synced) = self.sends.take_superseded(txn_id) {
            return vec![settled(txn_id, SendOutcome::Sent(synced))];
        }
        let Some(pending) = self.sends.pending_mut(txn_id) else {
            tracing::debug!(txn_id = %txn_id, "outcome for settled send ignored");
            return Vec::new();
        };
        if pending.phase != SendPhase::Sending {
            return Vec::new();
        }

        pending.phase = SendPhase::Sent(event_id.clone());
        let confirmed = pending.echo.confirmed(event_id.clone());
        pending.echo = confirmed.clone();

        let resident = self.store.update_echo(txn_id, |_| confirmed.clone()).is_some();
        tracing::info!(
            room_id = %self.room_id,
            txn_id = %txn_id,
            event_id = %event_id,
            "send confirmed"
        );

        let mut actions = vec![self.notify(RoomNotification::EventUpdated {
            room_id: self.room_id.clone(),
            txn_id: txn_id.clone(),
            event: confirmed,
        })];
        if resident {
            actions.push(self.state_changed());
        }
        actions.push(settled(txn_id, SendOutcome::Sent(event_id)));
        actions.push(self.persist());
        actions
    }

    fn handle_send_failed(
        &mut self,
        txn_id: &TransactionId,
        error: &TransportError,
    ) -> Vec<RoomAction> {
        if let Some(synced) = self.sends.take_superseded(txn_id) {
            return vec![settled(txn_id, SendOutcome::Sent(synced))];
        }
        let Some(pending) = self.sends.pending(txn_id) else {
            tracing::debug!(txn_id = %txn_id, "outcome for settled send ignored");
            return Vec::new();
        };
        if pending.phase != SendPhase::Sending {
            return Vec::new();
        }

        let elapsed = self.env.now() - pending.started;
        if error.is_transient() && elapsed < self.config.send_timeout {
            tracing::warn!(
                room_id = %self.room_id,
                txn_id = %txn_id,
                ?elapsed,
                "send attempt failed, retrying: {error}"
            );
            return vec![RoomAction::ScheduleRetry {
                txn_id: txn_id.clone(),
                delay: self.config.retry_interval,
            }];
        }

        let reason = if error.is_transient() {
            format!("deadline exceeded: {error}")
        } else {
            error.to_string()
        };
        self.fail_send(txn_id, &reason, SendOutcome::Failed { reason: reason.clone() })
    }

    fn handle_send_timed_out(&mut self, txn_id: &TransactionId) -> Vec<RoomAction> {
        if let Some(synced) = self.sends.take_superseded(txn_id) {
            return vec![settled(txn_id, SendOutcome::Sent(synced))];
        }
        match self.sends.pending(txn_id).map(|pending| pending.phase.clone()) {
            Some(SendPhase::Sending) => {
                let reason = "deadline exceeded: no response from transport";
                self.fail_send(txn_id, reason, SendOutcome::Failed { reason: reason.to_owned() })
            },
            Some(SendPhase::Sent(event_id)) => vec![settled(txn_id, SendOutcome::Sent(event_id))],
            None => Vec::new(),
        }
    }

    fn handle_retry_due(&mut self, txn_id: &TransactionId) -> Vec<RoomAction> {
        if let Some(synced) = self.sends.take_superseded(txn_id) {
            return vec![settled(txn_id, SendOutcome::Sent(synced))];
        }
        match self.sends.pending(txn_id) {
            Some(pending) if pending.phase == SendPhase::Sending => self.transmit(txn_id),
            _ => Vec::new(),
        }
    }

    fn handle_cancel(&mut self, txn_id: &TransactionId) -> Vec<RoomAction> {
        if let Some(synced) = self.sends.take_superseded(txn_id) {
            return vec![settled(txn_id, SendOutcome::Sent(synced))];
        }
        match self.sends.pending(txn_id).map(|pending| pending.phase.clone()) {
            Some(SendPhase::Sending) => self.fail_send(txn_id, "cancelled", SendOutcome::Cancelled),
            Some(SendPhase::Sent(event_id)) => vec![settled(txn_id, SendOutcome::Sent(event_id))],
            None => vec![settled(txn_id, SendOutcome::Cancelled)],
        }
    }

    /// Mark a pending send failed. Later outcomes for it are ignored.
    fn fail_send(
        &mut self,
        txn_id: &TransactionId,
        reason: &str,
        outcome: SendOutcome,
    ) -> Vec<RoomAction> {
        let Some(pending) = self.sends.pending(txn_id) else {
            return Vec::new();
        };
        let failed = pending.echo.with_new_status(EventStatus::Failed);
        self.sends.fail(txn_id, reason);
        let resident = self.store.update_echo(txn_id, |_| failed.clone()).is_some();

        tracing::info!(room_id = %self.room_id, txn_id = %txn_id, "send failed: {reason}");

        let mut actions = vec![
            self.notify(RoomNotification::EventUpdated {
                room_id: self.room_id.clone(),
                txn_id: txn_id.clone(),
                event: failed,
            }),
            self.notify(RoomNotification::SendFailed {
                room_id: self.room_id.clone(),
                txn_id: txn_id.clone(),
                reason: reason.to_owned(),
            }),
        ];
        if resident {
            actions.push(self.state_changed());
        }
        actions.push(settled(txn_id, outcome));
        actions.push(self.persist());
        actions
    }

    fn handle_resend(&mut self, txn_id: &TransactionId) -> Result<Vec<RoomAction>, ClientError> {
        let failed = self
            .sends
            .failed(txn_id)
            .ok_or_else(|| ClientError::UnknownTransaction { txn_id: txn_id.clone() })?;
        self.validate(&failed.event_type, &failed.content)?;

        let failed = self
            .sends
            .take_failed(txn_id)
            .ok_or_else(|| ClientError::UnknownTransaction { txn_id: txn_id.clone() })?;
        tracing::debug!(room_id = %self.room_id, txn_id = %txn_id, "resending failed send");
        self.handle_send(failed.event_type, failed.content, None)
    }

    fn handle_pagination_requested(&mut self, limit: u32) -> Result<Vec<RoomAction>, ClientError> {
        match self.pager.begin() {
            PagerStart::InFlight => {
                Err(ClientError::PaginationInFlight { room_id: self.room_id.clone() })
            },
            PagerStart::Exhausted => Ok(vec![RoomAction::PaginationSettled {
                request_id: None,
                outcome: PaginationOutcome::Exhausted,
            }]),
            PagerStart::Fetch { request_id, token } => {
                Ok(vec![RoomAction::FetchOlder { request_id, token, limit }])
            },
        }
    }

    fn handle_pagination_response(
        &mut self,
        request_id: u64,
        chunk: PaginationChunk,
    ) -> Vec<RoomAction> {
        if !self.pager.is_current(request_id) {
            tracing::debug!(
                room_id = %self.room_id,
                request_id,
                "stale pagination response dropped"
            );
            return vec![RoomAction::PaginationSettled {
                request_id: Some(request_id),
                outcome: PaginationOutcome::Discarded,
            }];
        }

        let PaginationChunk { chunk: events, state, end, .. } = chunk;
        if events.is_empty() {
            self.pager.exhaust(request_id);
            tracing::info!(room_id = %self.room_id, "history exhausted");
            return vec![
                RoomAction::PaginationSettled {
                    request_id: Some(request_id),
                    outcome: PaginationOutcome::Exhausted,
                },
                self.persist(),
            ];
        }

        let events: Vec<_> = events
            .into_iter()
            .map(|raw| StateEvent::new(raw, self.ordering.next_backward_key()))
            .collect();
        let mut changed = false;
        for event in &events {
            changed |= self.admit(event.clone());
        }
        for raw in state {
            let key = self.ordering.next_backward_key();
            changed |= self.admit(StateEvent::new(raw, key));
        }

        let count = events.len();
        if end.is_none() {
            tracing::info!(room_id = %self.room_id, "history exhausted");
        }
        self.pager.complete(request_id, end);

        let mut actions = vec![self.notify(RoomNotification::Timeline {
            room_id: self.room_id.clone(),
            events,
            origin: TimelineOrigin::Backfill,
        })];
        if changed {
            actions.push(self.state_changed());
        }
        actions.push(RoomAction::PaginationSettled {
            request_id: Some(request_id),
            outcome: PaginationOutcome::Applied { count },
        });
        actions.push(self.persist());
        actions
    }

    fn handle_reset(&mut self) -> Vec<RoomAction> {
        tracing::info!(room_id = %self.room_id, "room state reset");
        self.store.clear();
        self.ordering.reset();
        self.pager.reset();
        self.sends.clear();
        self.account_data = KeyValueStore::new();
        self.ephemeral = KeyValueStore::new();
        self.summary = RoomSummary::default();
        self.unread = UnreadNotifications::default();
        vec![self.state_changed(), self.persist()]
    }
}

fn settled(txn_id: &TransactionId, outcome: SendOutcome) -> RoomAction {
    RoomAction::SendSettled { txn_id: txn_id.clone(), outcome }
}
