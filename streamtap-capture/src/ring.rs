//! AF_PACKET capture through a memory-mapped TPACKET_V2 receive ring.
//!
//! The kernel fills ring frames and flips their status to `TP_STATUS_USER`;
//! we hand a frame back by resetting it to `TP_STATUS_KERNEL`. A frame stays
//! owned by userspace until the following `read_packet` call, which is what
//! lets packets borrow straight from the ring.

use streamtap_layers::LinkType;

use crate::source::PacketDataSource;
use crate::{CaptureError, Packet};

#[cfg(target_os = "linux")]
pub use linux::RingSource;

#[cfg(not(target_os = "linux"))]
pub use unsupported::RingSource;

#[cfg(target_os = "linux")]
mod linux {
    use std::ffi::CString;
    use std::io;
    use std::mem;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
    use std::ptr;
    use std::sync::atomic::{fence, Ordering};

    use chrono::DateTime;
    use pcap::{Capture, Linktype};
    use tracing::{debug, info};

    use super::*;
    use crate::sizing::{page_size, ring_sizing, RingSizing};
    use crate::{CaptureInfo, Origin};

    const PACKET_RX_RING: libc::c_int = 5;
    const PACKET_VERSION: libc::c_int = 10;
    const TPACKET_V2: libc::c_int = 1;
    const TP_STATUS_KERNEL: u32 = 0;
    const TP_STATUS_USER: u32 = 1;
    /// `TPACKET_ALIGN(sizeof(struct tpacket2_hdr))`
    const TPACKET2_HDRLEN: usize = 32;

    #[repr(C)]
    struct TpacketReq {
        tp_block_size: libc::c_uint,
        tp_block_nr: libc::c_uint,
        tp_frame_size: libc::c_uint,
        tp_frame_nr: libc::c_uint,
    }

    #[repr(C)]
    #[allow(dead_code)]
    struct Tpacket2Hdr {
        tp_status: u32,
        tp_len: u32,
        tp_snaplen: u32,
        tp_mac: u16,
        tp_net: u16,
        tp_sec: u32,
        tp_nsec: u32,
        tp_vlan_tci: u16,
        tp_vlan_tpid: u16,
        tp_padding: [u8; 4],
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(super) struct SockFilter {
        pub code: u16,
        pub jt: u8,
        pub jf: u8,
        pub k: u32,
    }

    #[repr(C)]
    struct SockFprog {
        len: libc::c_ushort,
        filter: *const SockFilter,
    }

    pub struct RingSource {
        socket: OwnedFd,
        ring: *mut u8,
        sizing: RingSizing,
        frame_count: usize,
        current: usize,
        // The current frame is still held by userspace.
        holding: bool,
    }

    // The mapping is owned exclusively by this value and only touched through
    // `&mut self`.
    unsafe impl Send for RingSource {}

    impl RingSource {
        pub fn open(device: &str, snaplen: u32, target_mb: usize) -> Result<Self, CaptureError> {
            let sizing = ring_sizing(target_mb, snaplen as usize, page_size())?;
            let ifindex = interface_index(device)?;
            let protocol = (libc::ETH_P_ALL as u16).to_be();

            // SAFETY: plain socket(2) call; the result is checked below.
            let raw = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, i32::from(protocol)) };
            if raw < 0 {
                return Err(io::Error::last_os_error().into());
            }
            // SAFETY: `raw` is a freshly created descriptor we own.
            let socket = unsafe { OwnedFd::from_raw_fd(raw) };

            set_option(&socket, libc::SOL_PACKET, PACKET_VERSION, &TPACKET_V2)?;

            let frame_count = sizing.frame_count();
            let request = TpacketReq {
                tp_block_size: to_uint(sizing.block_size)?,
                tp_block_nr: to_uint(sizing.num_blocks)?,
                tp_frame_size: to_uint(sizing.frame_size)?,
                tp_frame_nr: to_uint(frame_count)?,
            };
            set_option(&socket, libc::SOL_PACKET, PACKET_RX_RING, &request)?;

            // SAFETY: maps the ring the kernel just allocated for this socket.
            let ring = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    sizing.total_bytes(),
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    socket.as_raw_fd(),
                    0,
                )
            };
            if ring == libc::MAP_FAILED {
                return Err(io::Error::last_os_error().into());
            }
            let source = Self {
                socket,
                ring: ring.cast(),
                sizing,
                frame_count,
                current: 0,
                holding: false,
            };

            // SAFETY: sockaddr_ll is plain old data.
            let mut address: libc::sockaddr_ll = unsafe { mem::zeroed() };
            address.sll_family = libc::AF_PACKET as libc::c_ushort;
            address.sll_protocol = protocol;
            address.sll_ifindex = ifindex as libc::c_int;
            // SAFETY: `address` is a valid sockaddr_ll for the given length.
            let rc = unsafe {
                libc::bind(
                    source.socket.as_raw_fd(),
                    ptr::addr_of!(address).cast(),
                    mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
                )
            };
            if rc < 0 {
                return Err(io::Error::last_os_error().into());
            }

            info!(
                device = if device.is_empty() { "any" } else { device },
                frame_size = sizing.frame_size,
                block_size = sizing.block_size,
                num_blocks = sizing.num_blocks,
                "AF_PACKET ring mapped"
            );
            Ok(source)
        }

        fn frame(&self, index: usize) -> *mut u8 {
            // SAFETY: index < frame_count, so the offset stays inside the mapping.
            unsafe { self.ring.add(index * self.sizing.frame_size) }
        }

        fn status(&self, index: usize) -> u32 {
            let header = self.frame(index).cast::<Tpacket2Hdr>();
            // SAFETY: the header lies inside the mapping and the kernel updates
            // it concurrently, hence the volatile read.
            unsafe { ptr::read_volatile(ptr::addr_of!((*header).tp_status)) }
        }

        fn release_current(&mut self) {
            let header = self.frame(self.current).cast::<Tpacket2Hdr>();
            fence(Ordering::Release);
            // SAFETY: we own this frame until its status is written back.
            unsafe { ptr::write_volatile(ptr::addr_of_mut!((*header).tp_status), TP_STATUS_KERNEL) };
            self.current = (self.current + 1) % self.frame_count;
            self.holding = false;
        }

        fn wait_readable(&self) -> Result<(), CaptureError> {
            let mut poll_fd = libc::pollfd {
                fd: self.socket.as_raw_fd(),
                events: libc::POLLIN | libc::POLLERR,
                revents: 0,
            };
            // SAFETY: one valid pollfd, infinite timeout.
            let rc = unsafe { libc::poll(&mut poll_fd, 1, -1) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(CaptureError::Read(err.to_string()));
                }
            }
            Ok(())
        }
    }

    impl PacketDataSource for RingSource {
        fn read_packet(&mut self) -> Result<Option<Packet<'_>>, CaptureError> {
            if self.holding {
                self.release_current();
            }
            while self.status(self.current) & TP_STATUS_USER == 0 {
                self.wait_readable()?;
            }
            fence(Ordering::Acquire);
            self.holding = true;

            let frame = self.frame(self.current);
            // SAFETY: status says userspace owns this frame; the header and
            // the sockaddr_ll after it are inside the frame.
            let (header, address) = unsafe {
                (
                    &*frame.cast::<Tpacket2Hdr>(),
                    &*frame.add(TPACKET2_HDRLEN).cast::<libc::sockaddr_ll>(),
                )
            };
            let offset = usize::from(header.tp_mac);
            let captured = header.tp_snaplen as usize;
            if offset + captured > self.sizing.frame_size {
                return Err(CaptureError::Read(format!(
                    "ring frame reports {captured} bytes at offset {offset}, frame is {}",
                    self.sizing.frame_size
                )));
            }

            let info = CaptureInfo {
                timestamp: DateTime::from_timestamp(i64::from(header.tp_sec), header.tp_nsec)
                    .unwrap_or_default(),
                capture_length: captured,
                length: header.tp_len as usize,
                origin: Origin::Ring,
                interface_index: u32::try_from(address.sll_ifindex).ok(),
            };
            // SAFETY: bounds checked against the frame size above; the frame
            // is not handed back until the next call, which needs `&mut self`.
            let data = unsafe { std::slice::from_raw_parts(frame.add(offset), captured) };
            Ok(Some(Packet::new(data, info)))
        }

        fn set_filter(&mut self, expression: &str) -> Result<(), CaptureError> {
            if expression.trim().is_empty() {
                return Ok(());
            }
            let filter_error = |reason: String| CaptureError::Filter {
                expression: expression.to_string(),
                reason,
            };
            let program = Capture::dead(Linktype::ETHERNET)?
                .compile(expression, true)
                .map_err(|e| filter_error(e.to_string()))?;
            let instructions = program
                .get_instructions()
                .iter()
                .map(|instruction| parse_instruction(&instruction.to_string()))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| filter_error("unexpected BPF instruction format".into()))?;

            let fprog = SockFprog {
                len: libc::c_ushort::try_from(instructions.len())
                    .map_err(|_| filter_error("BPF program too long".into()))?,
                filter: instructions.as_ptr(),
            };
            set_option(
                &self.socket,
                libc::SOL_SOCKET,
                libc::SO_ATTACH_FILTER,
                &fprog,
            )
            .map_err(|e| filter_error(e.to_string()))?;
            debug!(expression, instructions = instructions.len(), "ring filter attached");
            Ok(())
        }

        fn link_type(&self) -> LinkType {
            LinkType::Ethernet
        }
    }

    impl Drop for RingSource {
        fn drop(&mut self) {
            // SAFETY: unmaps exactly the region mapped in `open`.
            unsafe {
                libc::munmap(self.ring.cast(), self.sizing.total_bytes());
            }
        }
    }

    /// Parses libpcap's "code jt jf k" rendering of one instruction.
    pub(super) fn parse_instruction(text: &str) -> Option<SockFilter> {
        let mut parts = text.split_whitespace();
        let filter = SockFilter {
            code: parts.next()?.parse().ok()?,
            jt: parts.next()?.parse().ok()?,
            jf: parts.next()?.parse().ok()?,
            k: parts.next()?.parse().ok()?,
        };
        parts.next().is_none().then_some(filter)
    }

    fn interface_index(device: &str) -> Result<u32, CaptureError> {
        if device.is_empty() || device == "any" {
            return Ok(0);
        }
        let name = CString::new(device).map_err(|_| {
            CaptureError::InvalidOptions(format!("interface name '{device}' contains NUL"))
        })?;
        // SAFETY: `name` is a valid NUL-terminated string.
        let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if index == 0 {
            return Err(CaptureError::InvalidOptions(format!(
                "unknown interface '{device}': {}",
                io::Error::last_os_error()
            )));
        }
        Ok(index)
    }

    fn set_option<T>(
        socket: &OwnedFd,
        level: libc::c_int,
        name: libc::c_int,
        value: &T,
    ) -> io::Result<()> {
        // SAFETY: `value` points to a live T of the size passed.
        let rc = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                level,
                name,
                (value as *const T).cast(),
                mem::size_of::<T>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn to_uint(value: usize) -> Result<libc::c_uint, CaptureError> {
        libc::c_uint::try_from(value)
            .map_err(|_| CaptureError::InvalidOptions(format!("ring dimension {value} too large")))
    }
}

#[cfg(not(target_os = "linux"))]
mod unsupported {
    use std::convert::Infallible;

    use super::*;

    pub struct RingSource {
        never: Infallible,
    }

    impl RingSource {
        pub fn open(_device: &str, _snaplen: u32, _target_mb: usize) -> Result<Self, CaptureError> {
            Err(CaptureError::Unsupported("AF_PACKET ring capture"))
        }
    }

    impl PacketDataSource for RingSource {
        fn read_packet(&mut self) -> Result<Option<Packet<'_>>, CaptureError> {
            match self.never {}
        }

        fn set_filter(&mut self, _expression: &str) -> Result<(), CaptureError> {
            match self.never {}
        }

        fn link_type(&self) -> LinkType {
            match self.never {}
        }
    }
}
