//! Flow identities derived from decoded headers.

use std::fmt;
use std::net::IpAddr;

/// Network-layer conversation: an ordered address pair. The address family
/// identifies the network protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkFlow {
    pub source: IpAddr,
    pub destination: IpAddr,
}

impl NetworkFlow {
    pub const fn new(source: IpAddr, destination: IpAddr) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub const fn reverse(&self) -> Self {
        Self::new(self.destination, self.source)
    }

    pub fn is_ipv6(&self) -> bool {
        self.source.is_ipv6()
    }
}

impl fmt::Display for NetworkFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source, self.destination)
    }
}

/// Transport-layer port pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportFlow {
    pub source_port: u16,
    pub destination_port: u16,
}

impl TransportFlow {
    pub const fn new(source_port: u16, destination_port: u16) -> Self {
        Self {
            source_port,
            destination_port,
        }
    }

    pub const fn reverse(&self) -> Self {
        Self::new(self.destination_port, self.source_port)
    }
}

impl fmt::Display for TransportFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.source_port, self.destination_port)
    }
}
