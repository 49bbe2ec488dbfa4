//! When to run a flush/close pass over the reassembler.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Connections idle this long are torn down regardless of state.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Decoded packets between two passes.
pub const FLUSH_EVERY_PACKETS: u64 = 1000;

/// Capture time between two passes on quiet links.
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(10);

/// Fires every `every_packets` decoded packets, and whenever capture time
/// has moved `interval` past the previous pass.
#[derive(Debug, Clone)]
pub struct EvictionSchedule {
    every_packets: u64,
    interval: TimeDelta,
    decoded: u64,
    last_pass: Option<DateTime<Utc>>,
}

impl EvictionSchedule {
    pub fn new(every_packets: u64, interval: Duration) -> Self {
        Self {
            every_packets: every_packets.max(1),
            interval: TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX),
            decoded: 0,
            last_pass: None,
        }
    }

    /// Records one decoded packet captured at `timestamp`; true when a pass
    /// is due now.
    pub fn on_decoded(&mut self, timestamp: DateTime<Utc>) -> bool {
        self.decoded += 1;
        let last = *self.last_pass.get_or_insert(timestamp);
        let due = self.decoded % self.every_packets == 0
            || timestamp.signed_duration_since(last) >= self.interval;
        if due {
            self.last_pass = Some(timestamp);
        }
        due
    }

    pub fn decoded(&self) -> u64 {
        self.decoded
    }
}

impl Default for EvictionSchedule {
    fn default() -> Self {
        Self::new(FLUSH_EVERY_PACKETS, DEFAULT_EVICTION_INTERVAL)
    }
}

/// `now - age`, saturating at the earliest representable time.
pub(crate) fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
