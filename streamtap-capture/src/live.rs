//! Live capture through libpcap.

use pcap::{Active, Capture};
use streamtap_layers::LinkType;
use tracing::debug;

use crate::source::{apply_pcap_filter, link_type_of, PacketDataSource};
use crate::{CaptureError, CaptureInfo, Origin, Packet};

const ANY_DEVICE: &str = "any";

pub struct LiveSource {
    capture: Capture<Active>,
    link_type: LinkType,
    // libpcap reuses its buffer across reads.
    scratch: Vec<u8>,
}

impl LiveSource {
    /// Opens `device` (or every interface when empty) in promiscuous mode
    /// with no read timeout.
    pub fn open(device: &str, snaplen: u32) -> Result<Self, CaptureError> {
        let name = if device.is_empty() { ANY_DEVICE } else { device };
        let capture = Capture::from_device(name)?
            .promisc(true)
            .snaplen(i32::try_from(snaplen).unwrap_or(i32::MAX))
            .timeout(0)
            .open()?;
        let link_type = link_type_of(capture.get_datalink());
        debug!(device = name, snaplen, ?link_type, "live capture opened");

        Ok(Self {
            capture,
            link_type,
            scratch: Vec::with_capacity(snaplen as usize),
        })
    }
}

impl PacketDataSource for LiveSource {
    fn read_packet(&mut self) -> Result<Option<Packet<'_>>, CaptureError> {
        let info = loop {
            match self.capture.next_packet() {
                Ok(packet) => {
                    self.scratch.clear();
                    self.scratch.extend_from_slice(packet.data);
                    break CaptureInfo::from_timeval(
                        i64::from(packet.header.ts.tv_sec),
                        i64::from(packet.header.ts.tv_usec),
                        packet.header.caplen as usize,
                        packet.header.len as usize,
                        Origin::Live,
                    );
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(e) => return Err(CaptureError::Read(e.to_string())),
            }
        };
        Ok(Some(Packet::new(&self.scratch, info)))
    }

    fn set_filter(&mut self, expression: &str) -> Result<(), CaptureError> {
        apply_pcap_filter(&mut self.capture, expression)
    }

    fn link_type(&self) -> LinkType {
        self.link_type
    }
}
