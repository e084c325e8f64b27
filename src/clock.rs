//! Monotonic nanosecond time source.

use std::sync::OnceLock;
use std::time::Instant;

/// Source of monotonic timestamps in nanoseconds.
pub trait TimeSource: Send + Sync {
    /// Current timestamp. Never returns 0.
    fn now_ns(&self) -> u64;
}

/// Process-wide monotonic clock.
///
/// All instances share one origin, so timestamps taken on different
/// worker threads are directly comparable.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

fn origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

impl TimeSource for MonotonicClock {
    #[inline]
    fn now_ns(&self) -> u64 {
        // 0 is reserved in frames for "no timestamp"
        origin().elapsed().as_nanos() as u64 + 1
    }
}

/// Convenience for `MonotonicClock.now_ns()`.
#[inline]
#[must_use]
pub fn now_ns() -> u64 {
    MonotonicClock.now_ns()
}
