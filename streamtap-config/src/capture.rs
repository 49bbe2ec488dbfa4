// streamtap-config/src/capture.rs
//! Packet capture configuration.
//!
//! Selects one of the capture backends and sizes it:
//! - live capture through libpcap
//! - AF_PACKET memory-mapped ring buffer
//! - offline replay of a pcap file

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Packet capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    Pcap,
    AfPacket,
    Offline,
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pcap" => Ok(SourceType::Pcap),
            "af_packet" => Ok(SourceType::AfPacket),
            "offline" => Ok(SourceType::Offline),
            other => Err(format!(
                "unsupported packet source type '{other}' (expected pcap, af_packet or offline)"
            )),
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceType::Pcap => "pcap",
            SourceType::AfPacket => "af_packet",
            SourceType::Offline => "offline",
        };
        f.write_str(name)
    }
}

/// Packet capture configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct CaptureConfig {
    /// Capture mechanism (pcap, af_packet or offline).
    #[serde(default)]
    pub source_type: SourceType,

    /// Network interface to listen on. Empty means every interface.
    #[validate(custom(function = validation::validate_interface))]
    #[serde(default)]
    pub device: String,

    /// Capture snapshot length in bytes.
    #[validate(range(min = 1, max = 262144))]
    #[serde(default = "default_snaplen")]
    pub snaplen: u32,

    /// AF_PACKET ring buffer size in megabytes.
    #[validate(range(min = 1, max = 65536))]
    #[serde(default = "default_buffer_size_mb")]
    pub buffer_size_mb: usize,

    /// Seconds to wait before flushing buffered data for an idle connection.
    #[validate(range(min = 1))]
    #[serde(default = "default_flush_timeout")]
    pub flush_timeout_secs: u64,

    /// Path to the pcap file for offline captures.
    #[serde(default)]
    pub pcap_file: Option<PathBuf>,
}

fn default_snaplen() -> u32 {
    65535
}

fn default_buffer_size_mb() -> usize {
    30
}

fn default_flush_timeout() -> u64 {
    60
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source_type: SourceType::default(),
            device: String::new(),
            snaplen: default_snaplen(),
            buffer_size_mb: default_buffer_size_mb(),
            flush_timeout_secs: default_flush_timeout(),
            pcap_file: None,
        }
    }
}
