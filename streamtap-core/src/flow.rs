use std::fmt;

use streamtap_layers::{NetworkFlow, TcpSegment, TransportFlow};

/// Identity of one direction of a TCP connection. [`FlowKey::reverse`]
/// names the other direction; both map to the same reassembly context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey {
    pub net: NetworkFlow,
    pub transport: TransportFlow,
}

impl FlowKey {
    pub const fn new(net: NetworkFlow, transport: TransportFlow) -> Self {
        Self { net, transport }
    }

    pub fn from_segment(net: NetworkFlow, segment: &TcpSegment<'_>) -> Self {
        Self::new(net, segment.transport_flow())
    }

    pub const fn reverse(&self) -> Self {
        Self::new(self.net.reverse(), self.transport.reverse())
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (src, dst) = (self.net.source, self.net.destination);
        let (sport, dport) = (self.transport.source_port, self.transport.destination_port);
        if self.net.is_ipv6() {
            write!(f, "[{src}]:{sport}->[{dst}]:{dport}")
        } else {
            write!(f, "{src}:{sport}->{dst}:{dport}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    #[test]
    fn display_and_reverse() {
        let key = FlowKey::new(
            NetworkFlow::new(
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, 2)),
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            ),
            TransportFlow::new(51000, 443),
        );
        assert_eq!(key.to_string(), "192.168.1.2:51000->1.1.1.1:443");
        assert_eq!(key.reverse().to_string(), "1.1.1.1:443->192.168.1.2:51000");
        assert_eq!(key.reverse().reverse(), key);
        assert_ne!(key.reverse(), key);
    }

    #[test]
    fn ipv6_addresses_are_bracketed() {
        let key = FlowKey::new(
            NetworkFlow::new(
                IpAddr::V6(Ipv6Addr::LOCALHOST),
                IpAddr::V6(Ipv6Addr::LOCALHOST),
            ),
            TransportFlow::new(1, 2),
        );
        assert_eq!(key.to_string(), "[::1]:1->[::1]:2");
    }
}
