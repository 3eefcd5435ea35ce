use chrono::{DateTime, Utc};

/// Source of wall-clock time for expiry decisions.
///
/// The manager never calls `Utc::now()` directly so that tests can drive
/// expiry and the refresh timer from the same (paused) clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
