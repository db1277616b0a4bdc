//! Simple time helpers used by multiple services.
//!
//! Wall-clock timestamps go through `chrono`; latency measurement uses the monotonic
//! `Instant` clock.

use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};

/// Current wall-clock time in UTC.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds elapsed since `start`, as a float for sub-millisecond latencies.
pub fn elapsed_ms(start: Instant) -> f64 {
    duration_ms(start.elapsed())
}

pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Convert a filesystem timestamp into UTC.
pub fn from_system(t: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(t)
}
