use std::time::Duration;

use chrono::{DateTime, Utc};
use streamtap_capture::{CaptureOptions, Packet, PacketDataSource, PacketSource};
use streamtap_core::{CaptureContext, ConsumerFactory, Reassembler, ReassemblyOptions};
use streamtap_layers::LayerParser;
use streamtap_telemetry::SnifferMetrics;
use tracing::{debug, info, instrument, trace, warn};

use super::eviction::{
    cutoff, EvictionSchedule, CLOSE_TIMEOUT, DEFAULT_EVICTION_INTERVAL, FLUSH_EVERY_PACKETS,
};
use super::SnifferError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnifferOptions {
    /// Idle time after which buffered out-of-order data is delivered.
    pub flush_timeout: Duration,
    /// Idle time after which a connection is torn down.
    pub close_timeout: Duration,
    pub flush_every_packets: u64,
    pub eviction_interval: Duration,
    pub reassembly: ReassemblyOptions,
}

impl SnifferOptions {
    pub fn new(flush_timeout: Duration) -> Self {
        Self {
            flush_timeout,
            close_timeout: CLOSE_TIMEOUT,
            flush_every_packets: FLUSH_EVERY_PACKETS,
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
            reassembly: ReassemblyOptions::default(),
        }
    }
}

impl From<&CaptureOptions> for SnifferOptions {
    fn from(options: &CaptureOptions) -> Self {
        Self::new(options.flush_timeout())
    }
}

/// Everything after the packet source. Split out so a packet borrowed from
/// the source can be processed while the rest of the sniffer is mutated.
struct Pipeline<F> {
    parser: LayerParser,
    reassembler: Reassembler<F>,
    schedule: EvictionSchedule,
    flush_timeout: Duration,
    close_timeout: Duration,
    metrics: SnifferMetrics,
}

impl<F: ConsumerFactory> Pipeline<F> {
    fn handle(&mut self, packet: Packet<'_>) {
        if packet.is_empty() {
            return;
        }

        let decoded = match self.parser.decode(packet.data) {
            Ok(decoded) => decoded,
            Err(e) => {
                trace!(error = %e, "undecodable packet");
                self.metrics.unparseable_packets.inc();
                return;
            }
        };

        let timestamp = packet.info.timestamp;
        if self.schedule.on_decoded(timestamp) {
            self.evict(timestamp);
        }

        match decoded.tcp_flow() {
            Some((net, segment)) => {
                self.reassembler
                    .assemble(net, segment, &CaptureContext::new(timestamp));
                self.metrics.parsed_packets.inc();
            }
            None => self.metrics.unparseable_packets.inc(),
        }
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let stats = self.reassembler.flush_older_than(
            cutoff(now, self.flush_timeout),
            cutoff(now, self.close_timeout),
        );
        self.metrics.flows_flushed.inc_by(stats.flushed as u64);
        self.metrics.flows_closed.inc_by(stats.closed as u64);
        self.metrics
            .active_flows
            .set(self.reassembler.active_flows() as i64);
    }

    fn finish(&mut self) -> usize {
        let remaining = self.reassembler.close_all();
        self.metrics.flows_closed.inc_by(remaining as u64);
        self.metrics.active_flows.set(0);
        remaining
    }
}

/// Reads packets until the source is exhausted and reassembles every TCP
/// connection it sees.
pub struct Sniffer<S, F> {
    source: S,
    pipeline: Pipeline<F>,
}

impl<F: ConsumerFactory> Sniffer<PacketSource, F> {
    /// Opens the configured packet source and applies the factory's filter.
    pub fn new(
        capture: &CaptureOptions,
        factory: F,
        metrics: SnifferMetrics,
    ) -> Result<Self, SnifferError> {
        let source = PacketSource::open(capture)?;
        Self::with_source(source, SnifferOptions::from(capture), factory, metrics)
    }
}

impl<S: PacketDataSource, F: ConsumerFactory> Sniffer<S, F> {
    pub fn with_source(
        mut source: S,
        options: SnifferOptions,
        factory: F,
        metrics: SnifferMetrics,
    ) -> Result<Self, SnifferError> {
        let filter = factory.bpf_filter();
        source.set_filter(&filter)?;
        if !filter.trim().is_empty() {
            info!(filter = %filter, "capture filter applied");
        }

        let pipeline = Pipeline {
            parser: LayerParser::new(source.link_type()),
            reassembler: Reassembler::new(factory, options.reassembly),
            schedule: EvictionSchedule::new(options.flush_every_packets, options.eviction_interval),
            flush_timeout: options.flush_timeout,
            close_timeout: options.close_timeout,
            metrics,
        };
        Ok(Self { source, pipeline })
    }

    /// Processes packets until the source reports end of input. Read errors
    /// are logged, counted and skipped.
    #[instrument(skip_all, name = "sniffer")]
    pub fn run(&mut self) -> Result<(), SnifferError> {
        info!(link_type = ?self.pipeline.parser.link_type(), "processing packets");
        loop {
            match self.source.read_packet() {
                Ok(Some(packet)) => self.pipeline.handle(packet),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "error reading packet");
                    self.pipeline.metrics.read_errors.inc();
                }
            }
        }

        let remaining = self.pipeline.finish();
        debug!(
            decoded = self.pipeline.schedule.decoded(),
            closed_at_end = remaining,
            "packet source exhausted"
        );
        Ok(())
    }

    pub fn active_flows(&self) -> usize {
        self.pipeline.reassembler.active_flows()
    }

    pub fn factory(&self) -> &F {
        self.pipeline.reassembler.factory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use streamtap_capture::{CaptureError, CaptureInfo, LinkType, Origin};
    use streamtap_core::{CloseReason, FlowKey, Reassembled, StreamConsumer};
    use streamtap_layers::testutil::{ipv4_tcp_frame, FrameSpec};
    use streamtap_layers::TcpFlags;
    use streamtap_telemetry::MetricsRecorder;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + seconds, 0).unwrap()
    }

    #[derive(Default)]
    struct MockSource {
        packets: VecDeque<Result<(Vec<u8>, DateTime<Utc>), CaptureError>>,
        current: Vec<u8>,
        filter: Option<String>,
        reject_filters: bool,
    }

    impl MockSource {
        fn push(&mut self, data: Vec<u8>, timestamp: DateTime<Utc>) {
            self.packets.push_back(Ok((data, timestamp)));
        }
    }

    impl PacketDataSource for MockSource {
        fn read_packet(&mut self) -> Result<Option<Packet<'_>>, CaptureError> {
            match self.packets.pop_front() {
                None => Ok(None),
                Some(Err(e)) => Err(e),
                Some(Ok((data, timestamp))) => {
                    self.current = data;
                    let info = CaptureInfo {
                        timestamp,
                        capture_length: self.current.len(),
                        length: self.current.len(),
                        origin: Origin::Offline,
                        interface_index: None,
                    };
                    Ok(Some(Packet::new(&self.current, info)))
                }
            }
        }

        fn set_filter(&mut self, expression: &str) -> Result<(), CaptureError> {
            if self.reject_filters {
                return Err(CaptureError::Filter {
                    expression: expression.into(),
                    reason: "rejected".into(),
                });
            }
            self.filter = Some(expression.into());
            Ok(())
        }

        fn link_type(&self) -> LinkType {
            LinkType::Ethernet
        }
    }

    #[derive(Default)]
    struct Seen {
        bytes: Vec<u8>,
        skipped: u64,
        created: usize,
        closes: Vec<CloseReason>,
    }

    #[derive(Default, Clone)]
    struct Collector(Arc<Mutex<Seen>>);

    struct CollectingConsumer(Arc<Mutex<Seen>>);

    impl StreamConsumer for CollectingConsumer {
        fn reassembled(&mut self, chunk: Reassembled<'_>) {
            let mut seen = self.0.lock();
            seen.bytes.extend_from_slice(chunk.bytes);
            seen.skipped += chunk.skipped;
        }

        fn reassembly_complete(&mut self, reason: CloseReason) {
            self.0.lock().closes.push(reason);
        }
    }

    impl ConsumerFactory for Collector {
        fn bpf_filter(&self) -> String {
            "tcp port 80".into()
        }

        fn new_consumer(
            &mut self,
            _key: &FlowKey,
            _context: &CaptureContext,
        ) -> Box<dyn StreamConsumer> {
            self.0.lock().created += 1;
            Box::new(CollectingConsumer(Arc::clone(&self.0)))
        }
    }

    fn tcp(sequence: u32, flags: TcpFlags, payload: &[u8]) -> Vec<u8> {
        let spec = FrameSpec {
            sequence,
            flags,
            ..FrameSpec::default()
        };
        ipv4_tcp_frame(&spec, payload)
    }

    fn udp() -> Vec<u8> {
        let spec = FrameSpec {
            protocol: 17,
            ..FrameSpec::default()
        };
        ipv4_tcp_frame(&spec, b"")
    }

    fn sniffer(
        source: MockSource,
        options: SnifferOptions,
    ) -> (Sniffer<MockSource, Collector>, Collector, MetricsRecorder) {
        let recorder = MetricsRecorder::new().unwrap();
        let collector = Collector::default();
        let sniffer = Sniffer::with_source(
            source,
            options,
            collector.clone(),
            recorder.sniffer.clone(),
        )
        .unwrap();
        (sniffer, collector, recorder)
    }

    fn default_options() -> SnifferOptions {
        SnifferOptions::new(Duration::from_secs(60))
    }

    #[test]
    fn counts_parsed_and_unparseable_packets() {
        let mut source = MockSource::default();
        source.push(tcp(100, TcpFlags::SYN, b""), at(0));
        source.push(tcp(101, TcpFlags::ACK, b"GET /"), at(0));
        source.push(udp(), at(0));
        source.push(vec![0xde, 0xad, 0xbe], at(0));

        let (mut sniffer, collector, recorder) = sniffer(source, default_options());
        sniffer.run().unwrap();

        assert_eq!(recorder.sniffer.parsed_packets.get(), 2);
        assert_eq!(recorder.sniffer.unparseable_packets.get(), 2);
        let seen = collector.0.lock();
        assert_eq!(seen.bytes, b"GET /");
        assert_eq!(seen.closes, vec![CloseReason::Shutdown]);
    }

    #[test]
    fn zero_length_packets_touch_no_counter() {
        let mut source = MockSource::default();
        source.push(Vec::new(), at(0));
        source.push(Vec::new(), at(1));

        let (mut sniffer, _, recorder) = sniffer(source, default_options());
        sniffer.run().unwrap();

        let metrics = &recorder.sniffer;
        assert_eq!(metrics.parsed_packets.get(), 0);
        assert_eq!(metrics.unparseable_packets.get(), 0);
        assert_eq!(metrics.read_errors.get(), 0);
    }

    #[test]
    fn read_errors_are_counted_and_skipped() {
        let mut source = MockSource::default();
        source
            .packets
            .push_back(Err(CaptureError::Read("interface went away".into())));
        source.push(tcp(1, TcpFlags::ACK, b"x"), at(0));

        let (mut sniffer, _, recorder) = sniffer(source, default_options());
        sniffer.run().unwrap();

        assert_eq!(recorder.sniffer.read_errors.get(), 1);
        assert_eq!(recorder.sniffer.parsed_packets.get(), 1);
    }

    #[test]
    fn factory_filter_is_applied() {
        let (sniffer, _, _) = sniffer(MockSource::default(), default_options());
        assert_eq!(sniffer.source.filter.as_deref(), Some("tcp port 80"));
        assert_eq!(sniffer.factory().bpf_filter(), "tcp port 80");
    }

    #[test]
    fn rejected_filter_fails_construction() {
        let source = MockSource {
            reject_filters: true,
            ..MockSource::default()
        };
        let recorder = MetricsRecorder::new().unwrap();
        let result = Sniffer::with_source(
            source,
            default_options(),
            Collector::default(),
            recorder.sniffer,
        );
        assert!(matches!(
            result,
            Err(SnifferError::Capture(CaptureError::Filter { .. }))
        ));
    }

    /// SYN and an out-of-order segment at t=0, filler until `decoded`
    /// packets, the last one 61 s later. Returns flows flushed before EOF.
    fn flushed_after(decoded: usize) -> u64 {
        let mut source = MockSource::default();
        source.push(tcp(100, TcpFlags::SYN, b""), at(0));
        source.push(tcp(111, TcpFlags::ACK, b"late"), at(0));
        for _ in 2..decoded - 1 {
            source.push(udp(), at(0));
        }
        source.push(udp(), at(61));

        let options = SnifferOptions {
            eviction_interval: Duration::from_secs(86_400),
            ..default_options()
        };
        let (mut sniffer, collector, recorder) = sniffer(source, options);
        sniffer.run().unwrap();
        assert_eq!(collector.0.lock().bytes, b"late");
        recorder.sniffer.flows_flushed.get()
    }

    #[test]
    fn eviction_pass_runs_every_thousand_decoded_packets() {
        assert_eq!(flushed_after(999), 0);
        assert_eq!(flushed_after(1000), 1);
    }

    #[test]
    fn eviction_pass_runs_when_capture_time_advances() {
        let mut source = MockSource::default();
        source.push(tcp(100, TcpFlags::SYN, b""), at(0));
        source.push(tcp(111, TcpFlags::ACK, b"late"), at(0));
        source.push(udp(), at(61));
        source.push(udp(), at(62));

        let (mut sniffer, collector, recorder) = sniffer(source, default_options());
        sniffer.run().unwrap();

        assert_eq!(recorder.sniffer.flows_flushed.get(), 1);
        let seen = collector.0.lock();
        assert_eq!(seen.bytes, b"late");
        assert_eq!(seen.skipped, 10);
    }

    #[test]
    fn idle_connections_are_closed() {
        let mut source = MockSource::default();
        source.push(tcp(100, TcpFlags::SYN, b""), at(0));
        source.push(tcp(101, TcpFlags::ACK, b"hi"), at(0));
        source.push(udp(), at(3601));

        let (mut sniffer, collector, recorder) = sniffer(source, default_options());
        sniffer.run().unwrap();

        assert_eq!(collector.0.lock().closes, vec![CloseReason::Idle]);
        // Both FINs closed the flow; nothing was left for the shutdown pass.
        assert_eq!(recorder.sniffer.flows_closed.get(), 0);
        assert_eq!(recorder.sniffer.active_flows.get(), 0);
        assert_eq!(sniffer.active_flows(), 0);
    }

    fn write_trace(path: &Path, frames: &[Vec<u8>]) {
        let capture = pcap::Capture::dead(pcap::Linktype::ETHERNET).unwrap();
        let mut savefile = capture.savefile(path).unwrap();
        for (i, frame) in frames.iter().enumerate() {
            let header = pcap::PacketHeader {
                ts: libc::timeval {
                    tv_sec: 1_700_000_000 + i as libc::time_t,
                    tv_usec: 0,
                },
                caplen: frame.len() as u32,
                len: frame.len() as u32,
            };
            savefile.write(&pcap::Packet::new(&header, frame));
        }
        savefile.flush().unwrap();
    }

    #[test]
    fn offline_capture_runs_to_end_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.pcap");
        let client = FrameSpec::default();
        let server = client.reply();
        write_trace(
            &path,
            &[
                ipv4_tcp_frame(&FrameSpec { flags: TcpFlags::SYN, ..client }, b""),
                ipv4_tcp_frame(
                    &FrameSpec {
                        sequence: 5000,
                        flags: TcpFlags::SYN | TcpFlags::ACK,
                        ..server
                    },
                    b"",
                ),
                ipv4_tcp_frame(&FrameSpec { sequence: 1001, ..client }, b"ping"),
                ipv4_tcp_frame(&FrameSpec { sequence: 5001, ..server }, b"pong"),
                ipv4_tcp_frame(
                    &FrameSpec {
                        sequence: 1005,
                        flags: TcpFlags::FIN | TcpFlags::ACK,
                        ..client
                    },
                    b"",
                ),
                ipv4_tcp_frame(
                    &FrameSpec {
                        sequence: 5005,
                        flags: TcpFlags::FIN | TcpFlags::ACK,
                        ..server
                    },
                    b"",
                ),
                ipv4_tcp_frame(&FrameSpec { sequence: 1006, ..client }, b""),
            ],
        );

        let recorder = MetricsRecorder::new().unwrap();
        let collector = Collector::default();
        let options = CaptureOptions::offline(&path).unwrap();
        let mut sniffer =
            Sniffer::new(&options, collector.clone(), recorder.sniffer.clone()).unwrap();
        sniffer.run().unwrap();

        assert_eq!(recorder.sniffer.parsed_packets.get(), 7);
        // Both FINs closed the flow; nothing was left for the shutdown pass.
        assert_eq!(recorder.sniffer.flows_closed.get(), 0);
        assert_eq!(recorder.sniffer.active_flows.get(), 0);
        assert_eq!(sniffer.active_flows(), 0);
        let seen = collector.0.lock();
        assert_eq!(seen.bytes, b"pingpong");
        assert_eq!(seen.created, 1);
        assert_eq!(seen.closes, vec![CloseReason::Finished]);
    }
}
