//! Simulated environment: virtual clocks and seeded randomness.
//!
//! Time never passes on its own. `sleep` advances the virtual clock by the
//! requested duration and yields once, so a send that retries for a minute
//! finishes instantly. `sleep_until` is the exception: it waits for the clock
//! to reach its deadline without moving it, so a hung call stays hung until
//! the test calls [`SimEnv::advance`] or other sleeps carry time past it.
//! The wall clock moves with the virtual clock but can be set independently,
//! including backwards.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll, Waker},
    time::Duration,
};

use parlor_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall clock at simulation start: 2023-11-14T22:13:20Z.
pub const SIM_EPOCH_MILLIS: u64 = 1_700_000_000_000;

#[derive(Debug)]
struct SimState {
    elapsed: Duration,
    wall_clock_millis: u64,
    frozen_wall_clock: bool,
    rng: ChaCha8Rng,
    deadlines: Vec<(Duration, Waker)>,
}

/// Deterministic [`Environment`].
///
/// Clones share one clock and one RNG.
#[derive(Debug, Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl SimEnv {
    /// Environment with seed 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment whose randomness is fixed by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                elapsed: Duration::ZERO,
                wall_clock_millis: SIM_EPOCH_MILLIS,
                frozen_wall_clock: false,
                rng: ChaCha8Rng::seed_from_u64(seed),
                deadlines: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Virtual time since the simulation started.
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// Move virtual time forward.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.elapsed += by;
        if !state.frozen_wall_clock {
            let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
            state.wall_clock_millis = state.wall_clock_millis.saturating_add(millis);
        }

        let now = state.elapsed;
        let (due, waiting) =
            std::mem::take(&mut state.deadlines).into_iter().partition(|(at, _)| *at <= now);
        state.deadlines = waiting;
        drop(state);
        for (_, waker) in due {
            waker.wake();
        }
    }

    /// Set the wall clock, e.g. backwards to model a clock correction.
    pub fn set_wall_clock(&self, millis: u64) {
        self.lock().wall_clock_millis = millis;
    }

    /// Stop (or resume) the wall clock following virtual time.
    pub fn freeze_wall_clock(&self, frozen: bool) {
        self.lock().frozen_wall_clock = frozen;
    }

    /// Uniform sample in `[0, 1)` from the shared RNG.
    pub fn random_unit(&self) -> f64 {
        // 53 random bits fill an f64 mantissa exactly.
        #[allow(clippy::cast_precision_loss)]
        let unit = (self.lock().rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        unit
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.elapsed()
    }

    fn wall_clock_millis(&self) -> u64 {
        self.lock().wall_clock_millis
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        let env = self.clone();
        async move {
            env.advance(duration);
            tokio::task::yield_now().await;
        }
    }

    fn sleep_until(&self, deadline: Duration) -> impl Future<Output = ()> + Send {
        Deadline { env: self.clone(), at: deadline }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.lock().rng.fill_bytes(buffer);
    }
}

/// Resolves once virtual time reaches `at`.
struct Deadline {
    env: SimEnv,
    at: Duration,
}

impl Future for Deadline {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.env.lock();
        if state.elapsed >= self.at {
            return Poll::Ready(());
        }
        let at = self.at;
        state.deadlines.retain(|(other, waker)| *other != at || !waker.will_wake(cx.waker()));
        state.deadlines.push((at, cx.waker().clone()));
        Poll::Pending
    }
}
