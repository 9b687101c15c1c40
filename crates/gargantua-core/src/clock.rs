//! Wall-clock source for reconcilers.
//!
//! Lifecycle decisions (event start/end, token expiry, retention) compare
//! against [`Clock::now`]; tests drive them with [`ManualClock`].
use std::sync::{Arc, Mutex};

use time::{Duration, OffsetDateTime};

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> OffsetDateTime;

    fn now_unix(&self) -> i64 {
        self.now().unix_timestamp()
    }
}

/// Shared clock handle.
pub type ClockHandle = Arc<dyn Clock>;

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(at: OffsetDateTime) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub fn set(&self, at: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// System clock handle.
pub fn system_clock() -> ClockHandle {
    Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn manual_clock_moves_only_on_demand() {
        let clock = ManualClock::new(datetime!(2024-01-02 15:00:00 UTC));
        assert_eq!(clock.now(), datetime!(2024-01-02 15:00:00 UTC));

        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), datetime!(2024-01-02 16:30:00 UTC));
        assert_eq!(clock.now_unix(), clock.now().unix_timestamp());

        clock.set(datetime!(2025-01-01 00:00:00 UTC));
        assert_eq!(clock.now(), datetime!(2025-01-01 00:00:00 UTC));
    }
}
