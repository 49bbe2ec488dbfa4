//! AF_PACKET ring geometry.

use crate::CaptureError;

/// Frames the kernel packs into one ring block.
pub const DEFAULT_FRAMES_PER_BLOCK: usize = 128;

/// Bytes preceding packet data in a TPACKET_V2 frame: the aligned
/// `tpacket2_hdr` followed by the aligned `sockaddr_ll`.
pub const TPACKET2_FRAME_OVERHEAD: usize = 80;

const MEGABYTE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSizing {
    pub frame_size: usize,
    pub block_size: usize,
    pub num_blocks: usize,
}

impl RingSizing {
    pub fn frames_per_block(&self) -> usize {
        self.block_size / self.frame_size
    }

    pub fn frame_count(&self) -> usize {
        self.frames_per_block() * self.num_blocks
    }

    pub fn total_bytes(&self) -> usize {
        self.block_size * self.num_blocks
    }
}

/// Derives frame, block and block-count sizes for a ring of roughly
/// `target_mb` megabytes.
///
/// Frames smaller than a page are packed several to a page. Otherwise a frame
/// spans enough whole pages to hold a full `snaplen` packet plus the frame
/// header.
pub fn ring_sizing(
    target_mb: usize,
    snaplen: usize,
    page_size: usize,
) -> Result<RingSizing, CaptureError> {
    if snaplen == 0 {
        return Err(CaptureError::InvalidOptions(
            "snaplen must be greater than zero".into(),
        ));
    }
    if page_size == 0 {
        return Err(CaptureError::InvalidOptions(
            "page size must be greater than zero".into(),
        ));
    }

    let frame_size = if snaplen < page_size {
        page_size / (page_size / snaplen)
    } else {
        (snaplen + TPACKET2_FRAME_OVERHEAD).div_ceil(page_size) * page_size
    };
    let block_size = frame_size * DEFAULT_FRAMES_PER_BLOCK;
    let num_blocks = target_mb.saturating_mul(MEGABYTE) / block_size;

    if num_blocks == 0 {
        return Err(CaptureError::BufferTooSmall {
            target_mb,
            block_size,
        });
    }

    Ok(RingSizing {
        frame_size,
        block_size,
        num_blocks,
    })
}

/// Runtime page size, falling back to 4 KiB when sysconf has no answer.
#[cfg(target_os = "linux")]
pub fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).ok().filter(|s| *s > 0).unwrap_or(4096)
}

#[cfg(not(target_os = "linux"))]
pub fn page_size() -> usize {
    4096
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_snaplen_frame_spans_whole_pages() {
        let sizing = ring_sizing(30, 65535, 4096).unwrap();
        assert_eq!(sizing.frame_size, 69632);
        assert_eq!(sizing.block_size, 69632 * 128);
        assert_eq!(sizing.num_blocks, 30 * MEGABYTE / (69632 * 128));
        assert_eq!(sizing.num_blocks, 3);
        assert_eq!(sizing.frames_per_block(), 128);
    }

    #[test]
    fn small_snaplen_packs_frames_into_a_page() {
        let sizing = ring_sizing(1, 1500, 4096).unwrap();
        assert_eq!(sizing.frame_size, 2048);
        assert_eq!(sizing.block_size, 2048 * 128);
        assert_eq!(sizing.num_blocks, 4);
        assert_eq!(sizing.frame_count(), 512);
        assert_eq!(sizing.total_bytes(), MEGABYTE);
    }

    #[test]
    fn snaplen_equal_to_page_adds_header_room() {
        let sizing = ring_sizing(64, 4096, 4096).unwrap();
        assert_eq!(sizing.frame_size, 8192);
    }

    #[test]
    fn header_room_rounds_up_to_the_next_page() {
        // 8120 + 80 bytes is just over two pages.
        let sizing = ring_sizing(64, 8120, 4096).unwrap();
        assert_eq!(sizing.frame_size, 12288);
        assert!(sizing.frame_size >= 8120 + TPACKET2_FRAME_OVERHEAD);

        // 8112 + 80 fits exactly in two.
        assert_eq!(ring_sizing(64, 8112, 4096).unwrap().frame_size, 8192);
    }

    #[test]
    fn zero_megabytes_cannot_hold_a_block() {
        assert!(matches!(
            ring_sizing(0, 65535, 4096),
            Err(CaptureError::BufferTooSmall { target_mb: 0, .. })
        ));
        // One block of 64 KiB frames is 8.5 MiB.
        assert!(matches!(
            ring_sizing(8, 65535, 4096),
            Err(CaptureError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn zero_inputs_are_rejected() {
        assert!(matches!(
            ring_sizing(30, 0, 4096),
            Err(CaptureError::InvalidOptions(_))
        ));
        assert!(matches!(
            ring_sizing(30, 65535, 0),
            Err(CaptureError::InvalidOptions(_))
        ));
    }
}
