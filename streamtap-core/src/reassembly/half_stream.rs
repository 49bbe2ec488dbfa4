//! One direction of a connection: a delivery cursor plus out-of-order pages.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use streamtap_layers::TcpSegment;

use crate::consumer::{CaptureContext, Direction, Reassembled, StreamConsumer};

struct Page {
    data: Bytes,
    timestamp: DateTime<Utc>,
}

/// Sequence numbers are mapped onto a 64-bit stream position relative to the
/// delivery cursor, so wrap-around never reorders data. Every buffered page
/// starts strictly after the cursor.
#[derive(Default)]
pub(crate) struct HalfStream {
    started: bool,
    /// Stream position of the next byte to deliver.
    next: u64,
    /// Sequence number of the byte at `next`.
    next_seq: u32,
    pages: BTreeMap<u64, Page>,
    fin_at: Option<u64>,
}

impl HalfStream {
    pub(crate) fn segment(
        &mut self,
        segment: &TcpSegment<'_>,
        context: &CaptureContext,
        max_pages: usize,
        direction: Direction,
        consumer: &mut dyn StreamConsumer,
    ) {
        // SYN occupies one sequence number ahead of the data.
        let data_seq = if segment.syn() {
            segment.sequence.wrapping_add(1)
        } else {
            segment.sequence
        };
        if !self.started {
            self.started = true;
            self.next_seq = data_seq;
        }

        // Before the start of the stream.
        let Some(start) = self.position(data_seq) else {
            return;
        };
        let payload = segment.payload;
        let end = start + payload.len() as u64;
        if segment.fin() && self.fin_at.is_none() {
            self.fin_at = Some(end);
        }
        if payload.is_empty() || end <= self.next {
            return;
        }

        if start <= self.next {
            let fresh = &payload[(self.next - start) as usize..];
            self.deliver(fresh, 0, *context, direction, consumer);
            self.drain(direction, consumer);
            return;
        }

        let page = Page {
            data: Bytes::copy_from_slice(payload),
            timestamp: context.timestamp,
        };
        match self.pages.get(&start) {
            Some(existing) if existing.data.len() >= payload.len() => {}
            _ => {
                self.pages.insert(start, page);
            }
        }
        if self.pages.len() > max_pages {
            self.skip_gap(direction, consumer);
        }
    }

    /// Delivers every buffered page, skipping over gaps. Returns whether
    /// anything was delivered.
    pub(crate) fn flush(&mut self, direction: Direction, consumer: &mut dyn StreamConsumer) -> bool {
        let mut delivered = false;
        while self.skip_gap(direction, consumer) {
            delivered = true;
        }
        delivered
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pages.is_empty()
    }

    /// FIN seen and every byte before it delivered.
    pub(crate) fn finished(&self) -> bool {
        matches!(self.fin_at, Some(fin) if self.next >= fin)
    }

    fn position(&self, seq: u32) -> Option<u64> {
        let offset = i64::from(seq.wrapping_sub(self.next_seq) as i32);
        self.next.checked_add_signed(offset)
    }

    fn advance(&mut self, count: u64) {
        self.next += count;
        self.next_seq = self.next_seq.wrapping_add(count as u32);
    }

    fn deliver(
        &mut self,
        bytes: &[u8],
        skipped: u64,
        context: CaptureContext,
        direction: Direction,
        consumer: &mut dyn StreamConsumer,
    ) {
        consumer.reassembled(Reassembled {
            direction,
            bytes,
            skipped,
            context,
        });
        self.advance(skipped + bytes.len() as u64);
    }

    fn drain(&mut self, direction: Direction, consumer: &mut dyn StreamConsumer) {
        while let Some(entry) = self.pages.first_entry() {
            let start = *entry.key();
            if start > self.next {
                break;
            }
            let page = entry.remove();
            self.deliver_page(start, page, direction, consumer);
        }
    }

    fn skip_gap(&mut self, direction: Direction, consumer: &mut dyn StreamConsumer) -> bool {
        let Some((start, page)) = self.pages.pop_first() else {
            return false;
        };
        self.deliver_page(start, page, direction, consumer);
        self.drain(direction, consumer);
        true
    }

    fn deliver_page(
        &mut self,
        start: u64,
        page: Page,
        direction: Direction,
        consumer: &mut dyn StreamConsumer,
    ) {
        let end = start + page.data.len() as u64;
        if end <= self.next {
            return;
        }
        let skipped = start.saturating_sub(self.next);
        let trim = self.next.saturating_sub(start) as usize;
        let fresh = page.data.slice(trim..);
        self.deliver(
            &fresh,
            skipped,
            CaptureContext::new(page.timestamp),
            direction,
            consumer,
        );
    }
}
