use pcap::Linktype;
use streamtap_config::SourceType;
use streamtap_layers::LinkType;
use tracing::info;

use crate::live::LiveSource;
use crate::offline::OfflineSource;
use crate::ring::RingSource;
use crate::{CaptureError, CaptureOptions, Packet};

/// Anything that yields raw packets one at a time.
pub trait PacketDataSource {
    /// Next packet, `Ok(None)` once the source is exhausted. An `Err` is a
    /// failed read; the source stays usable.
    fn read_packet(&mut self) -> Result<Option<Packet<'_>>, CaptureError>;

    /// Installs a BPF filter. An empty expression leaves the source unfiltered.
    fn set_filter(&mut self, expression: &str) -> Result<(), CaptureError>;

    fn link_type(&self) -> LinkType;
}

/// Packet source selected by [`CaptureOptions::source_type`].
pub enum PacketSource {
    Live(LiveSource),
    Ring(RingSource),
    Offline(OfflineSource),
}

impl PacketSource {
    pub fn open(options: &CaptureOptions) -> Result<Self, CaptureError> {
        let source = match options.source_type() {
            SourceType::Pcap => Self::Live(LiveSource::open(options.device(), options.snaplen())?),
            SourceType::AfPacket => Self::Ring(RingSource::open(
                options.device(),
                options.snaplen(),
                options.buffer_size_mb(),
            )?),
            SourceType::Offline => {
                let path = options.pcap_file().ok_or_else(|| {
                    CaptureError::InvalidOptions("offline capture requires a pcap file".into())
                })?;
                Self::Offline(OfflineSource::open(path)?)
            }
        };
        info!(
            source_type = %options.source_type(),
            device = options.device(),
            link_type = ?source.link_type(),
            "packet source opened"
        );
        Ok(source)
    }
}

impl PacketDataSource for PacketSource {
    fn read_packet(&mut self) -> Result<Option<Packet<'_>>, CaptureError> {
        match self {
            Self::Live(source) => source.read_packet(),
            Self::Ring(source) => source.read_packet(),
            Self::Offline(source) => source.read_packet(),
        }
    }

    fn set_filter(&mut self, expression: &str) -> Result<(), CaptureError> {
        match self {
            Self::Live(source) => source.set_filter(expression),
            Self::Ring(source) => source.set_filter(expression),
            Self::Offline(source) => source.set_filter(expression),
        }
    }

    fn link_type(&self) -> LinkType {
        match self {
            Self::Live(source) => source.link_type(),
            Self::Ring(source) => source.link_type(),
            Self::Offline(source) => source.link_type(),
        }
    }
}

/// Maps a libpcap data link type onto a decoder link type.
pub(crate) fn link_type_of(linktype: Linktype) -> LinkType {
    if linktype == Linktype::LINUX_SLL {
        LinkType::LinuxSll
    } else if linktype == Linktype::RAW
        || linktype == Linktype::IPV4
        || linktype == Linktype::IPV6
    {
        LinkType::RawIp
    } else {
        LinkType::Ethernet
    }
}

/// Applies `expression` to a libpcap handle, skipping empty expressions.
pub(crate) fn apply_pcap_filter<T: pcap::Activated + ?Sized>(
    capture: &mut pcap::Capture<T>,
    expression: &str,
) -> Result<(), CaptureError> {
    if expression.trim().is_empty() {
        return Ok(());
    }
    capture
        .filter(expression, true)
        .map_err(|e| CaptureError::Filter {
            expression: expression.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_type_mapping() {
        assert_eq!(link_type_of(Linktype::LINUX_SLL), LinkType::LinuxSll);
        assert_eq!(link_type_of(Linktype::RAW), LinkType::RawIp);
        assert_eq!(link_type_of(Linktype::IPV4), LinkType::RawIp);
        assert_eq!(link_type_of(Linktype::ETHERNET), LinkType::Ethernet);
        assert_eq!(link_type_of(Linktype(999)), LinkType::Ethernet);
    }

    #[test]
    fn missing_offline_file_fails_to_open() {
        let options = CaptureOptions::offline("/nonexistent/trace.pcap").unwrap();
        assert!(matches!(
            PacketSource::open(&options),
            Err(CaptureError::Pcap(_))
        ));
    }
}
