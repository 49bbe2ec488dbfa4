//! ## streamtap-layers::tcp
//! TCP segment as handed to the reassembler, viewed from an `etherparse`
//! slice.

use std::fmt;

use etherparse::TcpSlice;

use crate::flow::TransportFlow;

/// TCP control bits.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags(u16);

impl TcpFlags {
    pub const FIN: TcpFlags = TcpFlags(0x001);
    pub const SYN: TcpFlags = TcpFlags(0x002);
    pub const RST: TcpFlags = TcpFlags(0x004);
    pub const PSH: TcpFlags = TcpFlags(0x008);
    pub const ACK: TcpFlags = TcpFlags(0x010);
    pub const URG: TcpFlags = TcpFlags(0x020);
    pub const ECE: TcpFlags = TcpFlags(0x040);
    pub const CWR: TcpFlags = TcpFlags(0x080);
    pub const NS: TcpFlags = TcpFlags(0x100);

    pub const fn contains(self, other: TcpFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for TcpFlags {
    type Output = TcpFlags;

    fn bitor(self, rhs: TcpFlags) -> TcpFlags {
        TcpFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(TcpFlags, &str); 9] = [
            (TcpFlags::FIN, "FIN"),
            (TcpFlags::SYN, "SYN"),
            (TcpFlags::RST, "RST"),
            (TcpFlags::PSH, "PSH"),
            (TcpFlags::ACK, "ACK"),
            (TcpFlags::URG, "URG"),
            (TcpFlags::ECE, "ECE"),
            (TcpFlags::CWR, "CWR"),
            (TcpFlags::NS, "NS"),
        ];
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        if first {
            f.write_str("-")?;
        }
        Ok(())
    }
}

/// A decoded TCP segment.
#[derive(Debug, Clone, Copy)]
pub struct TcpSegment<'a> {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub acknowledgment: u32,
    pub flags: TcpFlags,
    pub window: u16,
    /// Options bytes between the fixed header and the payload.
    pub options: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> TcpSegment<'a> {
    pub fn transport_flow(&self) -> TransportFlow {
        TransportFlow::new(self.source_port, self.destination_port)
    }

    pub fn syn(&self) -> bool {
        self.flags.contains(TcpFlags::SYN)
    }

    pub fn fin(&self) -> bool {
        self.flags.contains(TcpFlags::FIN)
    }

    pub fn rst(&self) -> bool {
        self.flags.contains(TcpFlags::RST)
    }
}

impl<'a> From<&TcpSlice<'a>> for TcpSegment<'a> {
    fn from(tcp: &TcpSlice<'a>) -> Self {
        let bits = [
            (tcp.fin(), TcpFlags::FIN),
            (tcp.syn(), TcpFlags::SYN),
            (tcp.rst(), TcpFlags::RST),
            (tcp.psh(), TcpFlags::PSH),
            (tcp.ack(), TcpFlags::ACK),
            (tcp.urg(), TcpFlags::URG),
            (tcp.ece(), TcpFlags::ECE),
            (tcp.cwr(), TcpFlags::CWR),
            (tcp.ns(), TcpFlags::NS),
        ];
        let flags = bits
            .into_iter()
            .filter(|(set, _)| *set)
            .fold(TcpFlags::default(), |flags, (_, flag)| flags | flag);

        TcpSegment {
            source_port: tcp.source_port(),
            destination_port: tcp.destination_port(),
            sequence: tcp.sequence_number(),
            acknowledgment: tcp.acknowledgment_number(),
            flags,
            window: tcp.window_size(),
            options: &tcp.header_slice()[etherparse::TcpHeader::MIN_LEN..],
            payload: tcp.payload(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(data_offset_words: u8, flags: u8, tail: &[u8]) -> Vec<u8> {
        let mut raw = vec![0x1F, 0x90, 0xC3, 0x50];
        raw.extend_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        raw.extend_from_slice(&7u32.to_be_bytes());
        raw.extend_from_slice(&[data_offset_words << 4, flags, 0xFF, 0xFF, 0, 0, 0, 0]);
        raw.extend_from_slice(tail);
        raw
    }

    #[test]
    fn converts_header_and_payload() {
        let raw = segment(5, 0x18, b"GET /");
        let slice = TcpSlice::from_slice(&raw).unwrap();
        let tcp = TcpSegment::from(&slice);
        assert_eq!(tcp.source_port, 8080);
        assert_eq!(tcp.destination_port, 50000);
        assert_eq!(tcp.sequence, 0xDEAD_BEEF);
        assert_eq!(tcp.acknowledgment, 7);
        assert!(tcp.flags.contains(TcpFlags::PSH | TcpFlags::ACK));
        assert!(!tcp.syn());
        assert_eq!(tcp.payload, b"GET /");
        assert_eq!(format!("{:?}", tcp.flags), "PSH|ACK");
        assert_eq!(tcp.transport_flow(), TransportFlow::new(8080, 50000));
    }

    #[test]
    fn options_are_separated_from_payload() {
        let raw = segment(6, 0x02, &[2, 4, 5, 0xB4, b'x']);
        let slice = TcpSlice::from_slice(&raw).unwrap();
        let tcp = TcpSegment::from(&slice);
        assert!(tcp.syn());
        assert_eq!(tcp.options, &[2, 4, 5, 0xB4]);
        assert_eq!(tcp.payload, b"x");
    }

    #[test]
    fn fin_and_rst_bits() {
        let raw = segment(5, 0x05, &[]);
        let slice = TcpSlice::from_slice(&raw).unwrap();
        let tcp = TcpSegment::from(&slice);
        assert!(tcp.fin());
        assert!(tcp.rst());
        assert_eq!(format!("{:?}", TcpFlags::default()), "-");
    }
}
