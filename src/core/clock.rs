//! Time Source
//!
//! Protocol timestamps are Unix milliseconds. The room actor reads time
//! through `Clock` so tests can drive timing windows deterministically.

use std::sync::atomic::{AtomicI64, Ordering};

/// Unix time in milliseconds.
pub type TimestampMs = i64;

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Current Unix time in milliseconds.
    fn now_ms(&self) -> TimestampMs;
}

/// Wall clock backed by `chrono::Utc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> TimestampMs {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock fixed at `start_ms`.
    pub fn new(start_ms: TimestampMs) -> Self {
        Self { now: AtomicI64::new(start_ms) }
    }

    /// Move the clock forward.
    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, now_ms: TimestampMs) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> TimestampMs {
        self.now.load(Ordering::SeqCst)
    }
}
