//! # streamtap-engine
//!
//! The packet processing loop: read from a packet source, decode, feed TCP
//! segments to the reassembler and evict idle connections on capture time.

pub mod engine;

pub use engine::{Sniffer, SnifferError, SnifferOptions};
