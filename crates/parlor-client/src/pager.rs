//! Backward pagination token tracking.
//!
//! # Invariants
//!
//! - At most one request in flight.
//! - The token only changes after a response for the current request is
//!   fully applied, or when a limited live sync replaces it.
//! - Once exhausted, requests settle immediately until a limited sync
//!   provides a new token.

use serde::{Deserialize, Serialize};

/// Persisted pager fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagerCheckpoint {
    /// Continuation token.
    pub token: Option<String>,
    /// No older history exists.
    pub exhausted: bool,
}

/// Outcome of [`Pager::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagerStart {
    /// Issue a request with this id and token.
    Fetch {
        /// Request id.
        request_id: u64,
        /// Token to send, `None` if none known yet.
        token: Option<String>,
    },
    /// Nothing older exists.
    Exhausted,
    /// Another request is running.
    InFlight,
}

/// Pagination state of one room.
#[derive(Debug, Clone, Default)]
pub struct Pager {
    token: Option<String>,
    exhausted: bool,
    in_flight: Option<u64>,
    next_request_id: u64,
}

impl Pager {
    /// Fresh pager with no token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from persisted fields.
    pub fn restore(checkpoint: PagerCheckpoint) -> Self {
        Self { token: checkpoint.token, exhausted: checkpoint.exhausted, ..Self::default() }
    }

    /// Fields to persist.
    pub fn checkpoint(&self) -> PagerCheckpoint {
        PagerCheckpoint { token: self.token.clone(), exhausted: self.exhausted }
    }

    /// Current continuation token.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Whether history is exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Whether a request is running.
    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    /// Start a request.
    pub fn begin(&mut self) -> PagerStart {
        if self.in_flight.is_some() {
            return PagerStart::InFlight;
        }
        if self.exhausted {
            return PagerStart::Exhausted;
        }
        self.next_request_id += 1;
        self.in_flight = Some(self.next_request_id);
        PagerStart::Fetch { request_id: self.next_request_id, token: self.token.clone() }
    }

    /// Whether `request_id` is the running request.
    pub fn is_current(&self, request_id: u64) -> bool {
        self.in_flight == Some(request_id)
    }

    /// Finish the running request after its response was applied.
    ///
    /// `end` is the response's continuation token; `None` exhausts.
    pub fn complete(&mut self, request_id: u64, end: Option<String>) {
        if !self.is_current(request_id) {
            return;
        }
        self.in_flight = None;
        match end {
            Some(end) => self.token = Some(end),
            None => self.exhausted = true,
        }
    }

    /// Mark history exhausted without touching the token.
    pub fn exhaust(&mut self, request_id: u64) {
        if self.is_current(request_id) {
            self.in_flight = None;
            self.exhausted = true;
        }
    }

    /// Abandon the running request. The token is unchanged.
    pub fn abort(&mut self, request_id: u64) {
        if self.is_current(request_id) {
            self.in_flight = None;
        }
    }

    /// A live sync batch arrived with `prev_batch`.
    ///
    /// A limited batch replaces the token and re-opens history, and any
    /// running request becomes stale. Otherwise the token is only seeded if
    /// none is known yet.
    pub fn observe_sync(&mut self, prev_batch: Option<&str>, limited: bool) {
        let Some(prev_batch) = prev_batch else {
            return;
        };
        if limited {
            self.token = Some(prev_batch.to_owned());
            self.exhausted = false;
            self.in_flight = None;
        } else if self.token.is_none() && !self.exhausted {
            self.token = Some(prev_batch.to_owned());
        }
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.token = None;
        self.exhausted = false;
        self.in_flight = None;
    }
}
