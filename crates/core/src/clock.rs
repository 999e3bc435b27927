//! Injectable time and entropy sources.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    #[must_use]
    pub const fn new(at: DateTime<Utc>) -> Self {
        Self(Mutex::new(at))
    }

    /// Move the clock to `at`.
    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut guard) = self.0.lock() {
            *guard = at;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0.lock().map_or_else(|poisoned| *poisoned.into_inner(), |guard| *guard)
    }
}

/// Source of random bits for identifiers.
pub trait EntropySource: Send + Sync {
    fn next_u128(&self) -> u128;
}

/// Thread-local CSPRNG from `rand`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngEntropy;

impl EntropySource for ThreadRngEntropy {
    fn next_u128(&self) -> u128 {
        rand::random()
    }
}

/// Always returns the same bits.
#[derive(Debug, Clone, Copy)]
pub struct FixedEntropy(pub u128);

impl EntropySource for FixedEntropy {
    fn next_u128(&self) -> u128 {
        self.0
    }
}
