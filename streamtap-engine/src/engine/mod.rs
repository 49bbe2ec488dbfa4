mod error;
mod eviction;
mod sniffer;

pub use error::SnifferError;
pub use eviction::{EvictionSchedule, CLOSE_TIMEOUT, DEFAULT_EVICTION_INTERVAL, FLUSH_EVERY_PACKETS};
pub use sniffer::{Sniffer, SnifferOptions};
