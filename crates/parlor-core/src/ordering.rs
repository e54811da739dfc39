//! Sort-order generator.
//!
//! Issues [`OrderingKey`]s from two disjoint ranges:
//!
//! - forward: strictly increasing, seeded from wall-clock milliseconds, used
//!   for live sync data and local echoes
//! - backward: strictly decreasing from zero, used for backfilled history
//!
//! # Invariants
//!
//! - Every forward key is greater than every previously issued forward key,
//!   even if the wall clock stalls or moves backwards.
//! - Every backward key is less than every previously issued backward key.
//! - Forward keys are `>= 1` and backward keys are `<= -1`, so the ranges
//!   never interleave.

use parlor_proto::OrderingKey;
use serde::{Deserialize, Serialize};

/// Persisted counters of a [`SortOrderGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderingCheckpoint {
    /// Last issued forward key (0 when none issued).
    pub last_forward: i64,
    /// Last issued backward key (0 when none issued).
    pub last_backward: i64,
}

/// Per-room ordering key allocator.
#[derive(Debug, Clone, Default)]
pub struct SortOrderGenerator {
    last_forward: i64,
    last_backward: i64,
}

impl SortOrderGenerator {
    /// Create a generator with both ranges at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from persisted counters.
    ///
    /// Counters on the wrong side of zero are clamped so the ranges stay
    /// disjoint.
    pub fn restore(checkpoint: OrderingCheckpoint) -> Self {
        Self {
            last_forward: checkpoint.last_forward.max(0),
            last_backward: checkpoint.last_backward.min(0),
        }
    }

    /// Counters to persist.
    pub fn checkpoint(&self) -> OrderingCheckpoint {
        OrderingCheckpoint { last_forward: self.last_forward, last_backward: self.last_backward }
    }

    /// Next key in the forward range.
    ///
    /// Uses the wall clock when it is ahead of the last issued key, otherwise
    /// `last + 1`.
    pub fn next_forward_key(&mut self, wall_clock_millis: u64) -> OrderingKey {
        let wall = i64::try_from(wall_clock_millis).unwrap_or(i64::MAX);
        let next = wall.max(self.last_forward.saturating_add(1));
        self.last_forward = next;
        OrderingKey::new(next)
    }

    /// Next key in the backward range.
    pub fn next_backward_key(&mut self) -> OrderingKey {
        self.last_backward = self.last_backward.saturating_sub(1);
        OrderingKey::new(self.last_backward)
    }

    /// Reinitialize both ranges to zero.
    ///
    /// Only valid when the room's local state is rebuilt from scratch.
    pub fn reset(&mut self) {
        self.last_forward = 0;
        self.last_backward = 0;
    }
}
