//! # streamtap capture
//!
//! Packet sources for the capture pipeline:
//! - live capture through libpcap
//! - AF_PACKET `PACKET_RX_RING` capture (Linux)
//! - offline replay of pcap files
//!
//! Every source implements [`PacketDataSource`]; [`PacketSource::open`] picks
//! one from validated [`CaptureOptions`].

mod error;
pub mod live;
pub mod offline;
mod options;
mod packet;
pub mod ring;
pub mod sizing;
mod source;

pub use error::CaptureError;
pub use options::CaptureOptions;
pub use packet::{CaptureInfo, Origin, Packet};
pub use sizing::{ring_sizing, RingSizing};
pub use source::{PacketDataSource, PacketSource};
pub use streamtap_layers::LinkType;
