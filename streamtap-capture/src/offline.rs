//! Replay of a saved pcap file.

use std::path::Path;

use pcap::{Capture, Offline};
use streamtap_layers::LinkType;
use tracing::debug;

use crate::source::{apply_pcap_filter, link_type_of, PacketDataSource};
use crate::{CaptureError, CaptureInfo, Origin, Packet};

pub struct OfflineSource {
    capture: Capture<Offline>,
    link_type: LinkType,
    // A savefile cannot be resumed after a read error.
    exhausted: bool,
}

impl OfflineSource {
    pub fn open(path: &Path) -> Result<Self, CaptureError> {
        let capture = Capture::from_file(path)?;
        let link_type = link_type_of(capture.get_datalink());
        debug!(path = %path.display(), ?link_type, "pcap file opened");
        Ok(Self {
            capture,
            link_type,
            exhausted: false,
        })
    }
}

impl PacketDataSource for OfflineSource {
    fn read_packet(&mut self) -> Result<Option<Packet<'_>>, CaptureError> {
        if self.exhausted {
            return Ok(None);
        }
        match self.capture.next_packet() {
            Ok(packet) => {
                let info = CaptureInfo::from_timeval(
                    i64::from(packet.header.ts.tv_sec),
                    i64::from(packet.header.ts.tv_usec),
                    packet.header.caplen as usize,
                    packet.header.len as usize,
                    Origin::Offline,
                );
                Ok(Some(Packet::new(packet.data, info)))
            }
            Err(pcap::Error::NoMorePackets) => {
                self.exhausted = true;
                Ok(None)
            }
            Err(e) => {
                self.exhausted = true;
                Err(CaptureError::Read(e.to_string()))
            }
        }
    }

    fn set_filter(&mut self, expression: &str) -> Result<(), CaptureError> {
        apply_pcap_filter(&mut self.capture, expression)
    }

    fn link_type(&self) -> LinkType {
        self.link_type
    }
}
