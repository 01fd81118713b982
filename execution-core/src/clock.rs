//! Time capability (§9 "Clocks").
//!
//! Every place the engine or a bar aggregator reads wall-clock time goes
//! through a [`Clock`] rather than `SystemTime::now()` directly, so tests
//! can drive time deterministically with [`TestClock`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch.
pub type Timestamp = i64;

pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Advance-on-read hook for components (e.g. `TimeBarAggregator`) that
    /// need to know whether a scheduled boundary has elapsed. The default
    /// implementation simply compares against `now()`; `TestClock` overrides
    /// nothing here, it just lets the caller set `now()` manually.
    fn schedule_due(&self, deadline: Timestamp) -> bool {
        self.now() >= deadline
    }
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as Timestamp)
            .unwrap_or(0)
    }
}

/// Deterministic, manually-advanced clock for bar-aggregation tests.
#[derive(Debug)]
pub struct TestClock {
    now: AtomicI64,
}

impl TestClock {
    pub fn new(start: Timestamp) -> Self {
        TestClock { now: AtomicI64::new(start) }
    }

    pub fn set(&self, ts: Timestamp) {
        self.now.store(ts, Ordering::SeqCst);
    }

    pub fn advance(&self, delta: Timestamp) {
        self.now.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
