//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples room logic from system resources (time
//! and randomness). This enables:
//!
//! - Deterministic Simulation: a virtual clock and seeded RNG make retry
//!   deadlines and ordering keys reproducible without real delays.
//!
//! - Production Runtime: system time and OS entropy, with no changes to the
//!   room logic.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Wall clock: `wall_clock_millis()` MAY go backwards; callers that need
//!   monotonic values derived from it must guard against that themselves
//! - Isolation: Implementations must not share global state

use std::{
    fmt::Debug,
    future::Future,
    ops::{Add, Sub},
    time::Duration,
};

/// Abstract environment providing time, randomness, and async sleeping.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    type Instant: Copy
        + Ord
        + Debug
        + Send
        + Sync
        + Sub<Output = Duration>
        + Add<Duration, Output = Self::Instant>
        + 'static;

    /// Returns the current monotonic time.
    ///
    /// # Invariants
    ///
    /// - Monotonicity: Subsequent calls must return times >= previous calls.
    fn now(&self) -> Self::Instant;

    /// Milliseconds since the Unix epoch according to the wall clock.
    ///
    /// Used to seed forward ordering keys and local echo timestamps. Unlike
    /// `now()` this can jump backwards.
    fn wall_clock_millis(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this (retry intervals); room logic never does.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Resolves once `now()` reaches `deadline`.
    ///
    /// Guards work that may never finish, such as a send attempt. Simulated
    /// environments must not move their clock to satisfy it: the deadline
    /// passes only when something else advances time.
    fn sleep_until(&self, deadline: Self::Instant) -> impl Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u64`.
    ///
    /// Used for transaction id prefixes.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
