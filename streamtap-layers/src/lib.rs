//! # streamtap layer decoding
//!
//! Link, network and transport decoding for the capture pipeline, built on
//! `etherparse` slices. Everything borrows from the packet buffer; decoding a
//! packet performs no heap allocation.

use std::fmt;

use thiserror::Error;

pub mod flow;
pub mod parser;
pub mod tcp;
#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use flow::{NetworkFlow, TransportFlow};
pub use parser::{Decoded, LayerParser, LayerStack};
pub use tcp::{TcpFlags, TcpSegment};

/// Layers a packet can be decoded into, in the order they were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    LinuxSll,
    Ethernet,
    Ipv4,
    Ipv6,
    Tcp,
    Payload,
}

/// Link-layer encoding reported by a packet source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkType {
    #[default]
    Ethernet,
    /// Linux "cooked" capture, used by libpcap for the `any` device.
    LinuxSll,
    /// No link header, the packet starts with an IP header.
    RawIp,
}

impl LinkType {
    /// Layer recorded for the link header, if the encoding has one.
    pub fn layer(self) -> Option<LayerType> {
        match self {
            LinkType::Ethernet => Some(LayerType::Ethernet),
            LinkType::LinuxSll => Some(LayerType::LinuxSll),
            LinkType::RawIp => None,
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors that can occur while decoding packet headers.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot decode {link:?} packet: {source}")]
    Slice {
        link: LinkType,
        #[source]
        source: etherparse::err::packet::SliceError,
    },
    #[error("too many stacked layers")]
    TooManyLayers,
}
