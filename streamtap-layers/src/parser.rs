//! ## streamtap-layers::parser
//! Decodes a raw packet into the stack of layers it carries.
//!
//! Slicing is done by `etherparse`. Packets it can slice but that carry no
//! TCP (UDP, ARP, IP fragments, ...) decode without error; the caller decides
//! what a packet without TCP means. Truncated or malformed headers are
//! errors.

use etherparse::{NetSlice, SlicedPacket, TransportSlice};

use crate::flow::NetworkFlow;
use crate::tcp::TcpSegment;
use crate::{DecodeError, LayerType, LinkType};

pub const MAX_LAYERS: usize = 4;

/// Fixed-capacity, ordered list of decoded layer types.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct LayerStack {
    layers: [LayerType; MAX_LAYERS],
    len: usize,
}

impl Default for LayerStack {
    fn default() -> Self {
        Self {
            layers: [LayerType::Payload; MAX_LAYERS],
            len: 0,
        }
    }
}

impl LayerStack {
    pub fn from_slice(layers: &[LayerType]) -> Result<Self, DecodeError> {
        let mut stack = Self::default();
        for layer in layers {
            stack.push(*layer)?;
        }
        Ok(stack)
    }

    pub fn push(&mut self, layer: LayerType) -> Result<(), DecodeError> {
        if self.len == MAX_LAYERS {
            return Err(DecodeError::TooManyLayers);
        }
        self.layers[self.len] = layer;
        self.len += 1;
        Ok(())
    }

    pub fn as_slice(&self) -> &[LayerType] {
        &self.layers[..self.len]
    }

    pub fn iter(&self) -> impl Iterator<Item = LayerType> + '_ {
        self.as_slice().iter().copied()
    }

    pub fn contains(&self, layer: LayerType) -> bool {
        self.as_slice().contains(&layer)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for LayerStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// Headers found in one packet. Everything borrows from the packet buffer.
#[derive(Debug, Clone, Default)]
pub struct Decoded<'a> {
    pub layers: LayerStack,
    /// Address pair of the IPv4 or IPv6 header.
    pub network: Option<NetworkFlow>,
    pub tcp: Option<TcpSegment<'a>>,
    /// Bytes after the last decoded header.
    pub payload: &'a [u8],
}

impl<'a> Decoded<'a> {
    /// Returns the network flow and TCP segment when an IPv4 or IPv6 layer
    /// carries the TCP layer.
    pub fn tcp_flow(&self) -> Option<(NetworkFlow, &TcpSegment<'a>)> {
        Some((self.network?, self.tcp.as_ref()?))
    }

    fn from_sliced(link_type: LinkType, sliced: SlicedPacket<'a>) -> Result<Self, DecodeError> {
        let mut decoded = Decoded::default();
        if let (Some(layer), Some(_)) = (link_type.layer(), &sliced.link) {
            decoded.layers.push(layer)?;
        }

        match &sliced.net {
            Some(NetSlice::Ipv4(ip)) => {
                let header = ip.header();
                decoded.layers.push(LayerType::Ipv4)?;
                decoded.network = Some(NetworkFlow::new(
                    header.source_addr().into(),
                    header.destination_addr().into(),
                ));
                decoded.payload = ip.payload().payload;
            }
            Some(NetSlice::Ipv6(ip)) => {
                let header = ip.header();
                decoded.layers.push(LayerType::Ipv6)?;
                decoded.network = Some(NetworkFlow::new(
                    header.source_addr().into(),
                    header.destination_addr().into(),
                ));
                decoded.payload = ip.payload().payload;
            }
            _ => return Ok(decoded),
        }

        if let Some(TransportSlice::Tcp(tcp)) = &sliced.transport {
            let segment = TcpSegment::from(tcp);
            decoded.layers.push(LayerType::Tcp)?;
            if !segment.payload.is_empty() {
                decoded.layers.push(LayerType::Payload)?;
            }
            decoded.payload = segment.payload;
            decoded.tcp = Some(segment);
        }
        Ok(decoded)
    }
}

/// Stateless decoder bound to one link-layer encoding.
#[derive(Debug, Clone, Copy)]
pub struct LayerParser {
    link_type: LinkType,
}

impl LayerParser {
    pub fn new(link_type: LinkType) -> Self {
        Self { link_type }
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn decode<'a>(&self, data: &'a [u8]) -> Result<Decoded<'a>, DecodeError> {
        let sliced = match self.link_type {
            LinkType::Ethernet => SlicedPacket::from_ethernet(data),
            LinkType::LinuxSll => SlicedPacket::from_linux_sll(data),
            LinkType::RawIp => SlicedPacket::from_ip(data),
        }
        .map_err(|source| DecodeError::Slice {
            link: self.link_type,
            source,
        })?;
        Decoded::from_sliced(self.link_type, sliced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{ipv4_tcp_frame, ipv6_tcp_sll_frame, FrameSpec};
    use proptest::prelude::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn decodes_ethernet_ipv4_tcp() {
        let frame = ipv4_tcp_frame(&FrameSpec::default(), b"hello");
        let decoded = LayerParser::new(LinkType::Ethernet).decode(&frame).unwrap();

        assert_eq!(
            decoded.layers.as_slice(),
            &[
                LayerType::Ethernet,
                LayerType::Ipv4,
                LayerType::Tcp,
                LayerType::Payload
            ]
        );
        let (flow, tcp) = decoded.tcp_flow().unwrap();
        assert_eq!(flow.source, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(tcp.sequence, 1000);
        assert_eq!(tcp.payload, b"hello");
        assert_eq!(decoded.payload, b"hello");
    }

    #[test]
    fn decodes_linux_sll_ipv6_tcp() {
        let frame = ipv6_tcp_sll_frame(&FrameSpec::default(), b"xyz");
        let decoded = LayerParser::new(LinkType::LinuxSll).decode(&frame).unwrap();
        assert_eq!(
            decoded.layers.as_slice()[..3],
            [LayerType::LinuxSll, LayerType::Ipv6, LayerType::Tcp]
        );
        let (flow, tcp) = decoded.tcp_flow().unwrap();
        assert!(flow.is_ipv6());
        assert_eq!(tcp.payload, b"xyz");
    }

    #[test]
    fn pure_ack_has_no_payload_layer() {
        let frame = ipv4_tcp_frame(&FrameSpec::default(), b"");
        let decoded = LayerParser::new(LinkType::Ethernet).decode(&frame).unwrap();
        assert_eq!(decoded.layers.len(), 3);
        assert!(decoded.tcp_flow().is_some());
    }

    #[test]
    fn udp_stops_after_network_layer() {
        let spec = FrameSpec {
            protocol: 17,
            ..FrameSpec::default()
        };
        let frame = ipv4_tcp_frame(&spec, b"dns?");
        let decoded = LayerParser::new(LinkType::Ethernet).decode(&frame).unwrap();
        assert_eq!(
            decoded.layers.as_slice(),
            &[LayerType::Ethernet, LayerType::Ipv4]
        );
        assert!(decoded.network.is_some());
        assert!(decoded.tcp_flow().is_none());
    }

    #[test]
    fn vlan_tagged_frame() {
        let spec = FrameSpec {
            vlan: Some(42),
            ..FrameSpec::default()
        };
        let frame = ipv4_tcp_frame(&spec, b"v");
        let decoded = LayerParser::new(LinkType::Ethernet).decode(&frame).unwrap();
        let (_, tcp) = decoded.tcp_flow().unwrap();
        assert_eq!(tcp.payload, b"v");
    }

    #[test]
    fn raw_ip_link_type() {
        let frame = ipv4_tcp_frame(&FrameSpec::default(), b"raw");
        let decoded = LayerParser::new(LinkType::RawIp)
            .decode(&frame[14..])
            .unwrap();
        assert_eq!(decoded.layers.as_slice()[0], LayerType::Ipv4);
        assert_eq!(decoded.payload, b"raw");
    }

    #[test]
    fn truncated_packet_is_an_error() {
        let frame = ipv4_tcp_frame(&FrameSpec::default(), b"hello");
        let parser = LayerParser::new(LinkType::Ethernet);
        assert!(matches!(
            parser.decode(&frame[..frame.len() - 10]),
            Err(DecodeError::Slice {
                link: LinkType::Ethernet,
                ..
            })
        ));
        assert!(parser.decode(&[0xde, 0xad, 0xbe]).is_err());
    }

    #[test]
    fn tcp_without_network_layer_has_no_flow() {
        let frame = ipv4_tcp_frame(&FrameSpec::default(), b"data");
        let decoded = LayerParser::new(LinkType::Ethernet).decode(&frame).unwrap();

        let orphan = Decoded {
            layers: LayerStack::from_slice(&[LayerType::Ethernet, LayerType::Tcp]).unwrap(),
            tcp: decoded.tcp,
            ..Decoded::default()
        };
        assert!(orphan.tcp.is_some());
        assert!(orphan.tcp_flow().is_none());
    }

    #[test]
    fn layer_stack_is_bounded() {
        let mut stack = LayerStack::default();
        for _ in 0..MAX_LAYERS {
            stack.push(LayerType::Payload).unwrap();
        }
        assert!(matches!(
            stack.push(LayerType::Payload),
            Err(DecodeError::TooManyLayers)
        ));
    }

    proptest! {
        #[test]
        fn decoding_arbitrary_bytes_never_panics(data in proptest::collection::vec(any::<u8>(), 0..200)) {
            for link in [LinkType::Ethernet, LinkType::LinuxSll, LinkType::RawIp] {
                let _ = LayerParser::new(link).decode(&data);
            }
        }
    }
}
