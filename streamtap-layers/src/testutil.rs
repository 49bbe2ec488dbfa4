//! Frame builders for tests in this and downstream crates.

use std::net::{Ipv4Addr, Ipv6Addr};

use etherparse::{PacketBuilder, PacketBuilderStep, TcpHeader, VlanId};

use crate::tcp::TcpFlags;

const SOURCE_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 1];
const DESTINATION_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 2];
const IPPROTO_TCP: u8 = 6;

#[derive(Debug, Clone, Copy)]
pub struct FrameSpec {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub acknowledgment: u32,
    pub flags: TcpFlags,
    /// IP protocol. 6 builds a TCP segment, anything else a UDP datagram.
    pub protocol: u8,
    pub vlan: Option<u16>,
}

impl Default for FrameSpec {
    fn default() -> Self {
        Self {
            source: Ipv4Addr::new(10, 0, 0, 1),
            destination: Ipv4Addr::new(10, 0, 0, 2),
            source_port: 40000,
            destination_port: 80,
            sequence: 1000,
            acknowledgment: 0,
            flags: TcpFlags::ACK,
            protocol: IPPROTO_TCP,
            vlan: None,
        }
    }
}

impl FrameSpec {
    /// Same connection, opposite direction.
    pub fn reply(&self) -> Self {
        Self {
            source: self.destination,
            destination: self.source,
            source_port: self.destination_port,
            destination_port: self.source_port,
            ..*self
        }
    }
}

fn with_flags(
    mut tcp: PacketBuilderStep<TcpHeader>,
    spec: &FrameSpec,
) -> PacketBuilderStep<TcpHeader> {
    if spec.flags.contains(TcpFlags::SYN) {
        tcp = tcp.syn();
    }
    if spec.flags.contains(TcpFlags::FIN) {
        tcp = tcp.fin();
    }
    if spec.flags.contains(TcpFlags::RST) {
        tcp = tcp.rst();
    }
    if spec.flags.contains(TcpFlags::PSH) {
        tcp = tcp.psh();
    }
    if spec.flags.contains(TcpFlags::ACK) {
        tcp = tcp.ack(spec.acknowledgment);
    }
    tcp
}

/// Ethernet (optionally VLAN tagged) + IPv4 + TCP.
pub fn ipv4_tcp_frame(spec: &FrameSpec, payload: &[u8]) -> Vec<u8> {
    let ethernet = PacketBuilder::ethernet2(SOURCE_MAC, DESTINATION_MAC);
    let (source, destination) = (spec.source.octets(), spec.destination.octets());
    let ip = match spec.vlan {
        Some(id) => ethernet
            .single_vlan(VlanId::try_new(id).unwrap())
            .ipv4(source, destination, 64),
        None => ethernet.ipv4(source, destination, 64),
    };

    let mut frame = Vec::new();
    if spec.protocol == IPPROTO_TCP {
        let tcp = ip.tcp(spec.source_port, spec.destination_port, spec.sequence, 65535);
        with_flags(tcp, spec).write(&mut frame, payload).unwrap();
    } else {
        ip.udp(spec.source_port, spec.destination_port)
            .write(&mut frame, payload)
            .unwrap();
    }
    frame
}

/// Linux cooked header + IPv6 + TCP between 2001:db8::1 and 2001:db8::2.
pub fn ipv6_tcp_sll_frame(spec: &FrameSpec, payload: &[u8]) -> Vec<u8> {
    // Unicast to us, ARPHRD_ETHER, 6-byte address, protocol IPv6.
    let mut frame = vec![0x00, 0x00, 0x00, 0x01, 0x00, 0x06, 2, 0, 0, 0, 0, 1, 0, 0, 0x86, 0xDD];
    let ip = PacketBuilder::ipv6(
        Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1).octets(),
        Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2).octets(),
        64,
    );
    let tcp = ip.tcp(spec.source_port, spec.destination_port, spec.sequence, 65535);
    with_flags(tcp, spec).write(&mut frame, payload).unwrap();
    frame
}
