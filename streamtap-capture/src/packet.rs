//! Packets as handed out by a source.

use chrono::{DateTime, Utc};

/// Backend a packet came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Live,
    Ring,
    Offline,
}

/// Capture metadata for one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureInfo {
    pub timestamp: DateTime<Utc>,
    /// Bytes actually captured (at most the snaplen).
    pub capture_length: usize,
    /// Length of the packet on the wire.
    pub length: usize,
    pub origin: Origin,
    /// Kernel interface index, when the backend reports one.
    pub interface_index: Option<u32>,
}

impl CaptureInfo {
    pub fn from_timeval(
        seconds: i64,
        micros: i64,
        capture_length: usize,
        length: usize,
        origin: Origin,
    ) -> Self {
        let nanos = u32::try_from(micros.clamp(0, 999_999) * 1_000).unwrap_or(0);
        Self {
            timestamp: DateTime::from_timestamp(seconds, nanos).unwrap_or_default(),
            capture_length,
            length,
            origin,
            interface_index: None,
        }
    }
}

/// A packet borrowed from its source until the next read.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    pub data: &'a [u8],
    pub info: CaptureInfo,
}

impl<'a> Packet<'a> {
    pub fn new(data: &'a [u8], info: CaptureInfo) -> Self {
        Self { data, info }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
