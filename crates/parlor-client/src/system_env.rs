//! Production Environment implementation using system time and RNG.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parlor_core::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// - `std::time::Instant` for the monotonic clock
/// - `SystemTime` for wall-clock milliseconds
/// - `tokio::time::sleep()` for async sleeping
/// - `getrandom` for randomness
#[derive(Debug, Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn sleep_until(&self, deadline: Instant) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline))
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // Zeros only weaken transaction id prefixes.
            tracing::error!("getrandom failed: {}", e);
            buffer.fill(0);
        });
    }
}
