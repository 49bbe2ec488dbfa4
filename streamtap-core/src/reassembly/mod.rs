//! ## streamtap-core::reassembly
//! TCP stream reassembly keyed by connection.
//!
//! In-order data goes to the consumer straight from the packet buffer;
//! out-of-order data is copied into pages until the gap closes, the half
//! buffers too many pages, or the connection goes idle. Bytes are never
//! delivered twice.

mod half_stream;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use streamtap_layers::{NetworkFlow, TcpFlags, TcpSegment};
use tracing::{debug, trace};

use crate::consumer::{
    CaptureContext, CloseReason, ConsumerFactory, Direction, StreamConsumer,
};
use crate::FlowKey;
use half_stream::HalfStream;

pub const DEFAULT_MAX_BUFFERED_PAGES_PER_HALF: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyOptions {
    /// Out-of-order pages one direction may hold before the oldest gap is
    /// skipped.
    pub max_buffered_pages_per_half: usize,
}

impl Default for ReassemblyOptions {
    fn default() -> Self {
        Self {
            max_buffered_pages_per_half: DEFAULT_MAX_BUFFERED_PAGES_PER_HALF,
        }
    }
}

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Connections whose buffered pages were delivered.
    pub flushed: usize,
    /// Connections torn down.
    pub closed: usize,
}

struct FlowContext {
    key: FlowKey,
    halves: [HalfStream; 2],
    consumer: Box<dyn StreamConsumer>,
    last_seen: DateTime<Utc>,
}

impl FlowContext {
    fn new(key: FlowKey, consumer: Box<dyn StreamConsumer>, seen: DateTime<Utc>) -> Self {
        Self {
            key,
            halves: Default::default(),
            consumer,
            last_seen: seen,
        }
    }

    fn segment(
        &mut self,
        direction: Direction,
        segment: &TcpSegment<'_>,
        context: &CaptureContext,
        max_pages: usize,
    ) {
        if context.timestamp > self.last_seen {
            self.last_seen = context.timestamp;
        }
        self.halves[direction.index()].segment(
            segment,
            context,
            max_pages,
            direction,
            self.consumer.as_mut(),
        );
    }

    fn flush(&mut self) -> bool {
        let consumer = self.consumer.as_mut();
        let [forward, reverse] = &mut self.halves;
        let forward_flushed = forward.flush(Direction::Forward, consumer);
        let reverse_flushed = reverse.flush(Direction::Reverse, consumer);
        forward_flushed || reverse_flushed
    }

    fn has_pending(&self) -> bool {
        self.halves.iter().any(HalfStream::has_pending)
    }

    fn finished(&self) -> bool {
        self.halves.iter().all(HalfStream::finished)
    }

    fn complete(mut self, reason: CloseReason) {
        trace!(flow = %self.key, ?reason, "connection complete");
        self.consumer.reassembly_complete(reason);
    }
}

/// Owns every live connection and the factory that creates their consumers.
pub struct Reassembler<F> {
    factory: F,
    flows: HashMap<FlowKey, FlowContext>,
    options: ReassemblyOptions,
}

impl<F: ConsumerFactory> Reassembler<F> {
    pub fn new(factory: F, options: ReassemblyOptions) -> Self {
        Self {
            factory,
            flows: HashMap::new(),
            options,
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn active_flows(&self) -> usize {
        self.flows.len()
    }

    /// Feeds one TCP segment travelling along `net`.
    pub fn assemble(&mut self, net: NetworkFlow, segment: &TcpSegment<'_>, context: &CaptureContext) {
        let key = FlowKey::from_segment(net, segment);
        let (canonical, direction) = if self.flows.contains_key(&key) {
            (key, Direction::Forward)
        } else if self.flows.contains_key(&key.reverse()) {
            (key.reverse(), Direction::Reverse)
        } else if segment.syn() || !segment.payload.is_empty() {
            self.open_flow(key, segment, context)
        } else {
            // Bare ACK, FIN or RST of a connection we are not tracking, such
            // as the last ACK after both FINs.
            trace!(
                flow = %key,
                flags = ?segment.flags,
                "segment for unknown connection ignored"
            );
            return;
        };

        let Some(flow) = self.flows.get_mut(&canonical) else {
            return;
        };
        flow.segment(
            direction,
            segment,
            context,
            self.options.max_buffered_pages_per_half,
        );

        if segment.rst() {
            if let Some(mut flow) = self.flows.remove(&canonical) {
                flow.flush();
                flow.complete(CloseReason::Reset);
            }
        } else if flow.finished() {
            if let Some(flow) = self.flows.remove(&canonical) {
                flow.complete(CloseReason::Finished);
            }
        }
    }

    /// Delivers buffered data of connections silent since `flush_cutoff` and
    /// tears down connections silent since `close_cutoff`.
    pub fn flush_older_than(
        &mut self,
        flush_cutoff: DateTime<Utc>,
        close_cutoff: DateTime<Utc>,
    ) -> FlushStats {
        let mut stats = FlushStats::default();
        let mut completed = Vec::new();

        for (key, flow) in self.flows.iter_mut() {
            if flow.last_seen < close_cutoff {
                flow.flush();
                completed.push((*key, CloseReason::Idle));
            } else if flow.last_seen < flush_cutoff && flow.has_pending() {
                flow.flush();
                stats.flushed += 1;
                if flow.finished() {
                    completed.push((*key, CloseReason::Finished));
                }
            }
        }

        for (key, reason) in completed {
            if let Some(flow) = self.flows.remove(&key) {
                flow.complete(reason);
                stats.closed += 1;
            }
        }

        if stats.flushed > 0 || stats.closed > 0 {
            debug!(
                flushed = stats.flushed,
                closed = stats.closed,
                active = self.flows.len(),
                "eviction pass"
            );
        }
        stats
    }

    /// Flushes and completes every connection. Returns how many there were.
    pub fn close_all(&mut self) -> usize {
        let count = self.flows.len();
        for (_, mut flow) in self.flows.drain() {
            flow.flush();
            flow.complete(CloseReason::Shutdown);
        }
        count
    }

    fn open_flow(
        &mut self,
        key: FlowKey,
        segment: &TcpSegment<'_>,
        context: &CaptureContext,
    ) -> (FlowKey, Direction) {
        // A SYN-ACK comes from the responder.
        let (forward, direction) = if segment.syn() && segment.flags.contains(TcpFlags::ACK) {
            (key.reverse(), Direction::Reverse)
        } else {
            (key, Direction::Forward)
        };
        let consumer = self.factory.new_consumer(&forward, context);
        trace!(flow = %forward, "new connection");
        self.flows
            .insert(forward, FlowContext::new(forward, consumer, context.timestamp));
        (forward, direction)
    }
}
