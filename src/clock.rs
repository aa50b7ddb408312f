use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, Timelike};

/// Source of the local wall-clock "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
    fn label(&self) -> &'static str;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn label(&self) -> &'static str {
        "SYSTEM_LOCAL"
    }
}

/// Always reports the same instant.
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }

    fn label(&self) -> &'static str {
        "FIXED"
    }
}

pub fn parse_local_datetime(input: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M"))
        .with_context(|| format!("invalid local datetime '{input}', expected YYYY-MM-DDTHH:MM[:SS]"))
}

/// Delay until the next whole second of `now`, so ticks land just after
/// each second boundary.
pub fn until_next_second(now: NaiveDateTime) -> Duration {
    let nanos = u64::from(now.nanosecond() % 1_000_000_000);
    Duration::from_nanos(1_000_000_000 - nanos)
}

/// Sleeps until `deadline`, finishing with a short yield loop.
pub fn sleep_until(deadline: Instant) {
    let now = Instant::now();
    if now >= deadline {
        return;
    }

    let remaining = deadline.saturating_duration_since(now);
    if remaining > Duration::from_millis(2) {
        std::thread::sleep(remaining - Duration::from_millis(1));
    }
    while Instant::now() < deadline {
        std::thread::yield_now();
    }
}
