//! Clock & ID generation.
//!
//! A trait-bound clock lets the verifier and escrow reconciler be tested
//! against a fixed point in time instead of real wall-clock time, the way
//! the teacher's coordinators take their dependencies by construction
//! rather than reaching for `chrono::Utc::now()` ambiently everywhere.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock fixed at construction time, advanced explicitly by tests.
pub struct FixedClock {
    inner: std::sync::Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            inner: std::sync::Mutex::new(at),
        }
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.inner.lock().unwrap();
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.lock().unwrap()
    }
}

/// Generate a new UUID v4 — used for `message_id`, event ids, and any
/// identifier the wire protocol requires to be a UUID.
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let base = Utc::now();
        let clock = FixedClock::new(base);
        assert_eq!(clock.now(), base);
        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(clock.now(), base + chrono::Duration::seconds(60));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
