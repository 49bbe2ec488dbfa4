//! ## streamtap-telemetry::metrics
//! **Prometheus counters, one registry per recorder**
//!
//! Components never reach for process-wide metrics. They receive a narrow
//! handle (`SnifferMetrics`, `PublishMetrics`) at construction; cloning a
//! handle shares the underlying counters.

use prometheus::{IntCounter, IntGauge, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub sniffer: SnifferMetrics,
    pub publish: PublishMetrics,
}

/// Counters owned by the packet processing loop.
#[derive(Debug, Clone)]
pub struct SnifferMetrics {
    pub parsed_packets: IntCounter,
    pub unparseable_packets: IntCounter,
    pub read_errors: IntCounter,
    pub flows_flushed: IntCounter,
    pub flows_closed: IntCounter,
    pub active_flows: IntGauge,
}

/// Delivery outcome counters owned by the publisher's response task.
#[derive(Debug, Clone)]
pub struct PublishMetrics {
    pub events_published: IntCounter,
    pub events_dropped: IntCounter,
    pub events_sampled_out: IntCounter,
    pub event_errors: IntCounter,
    pub event_http_errors: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl SnifferMetrics {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let active_flows = IntGauge::new(
            "sniffer_active_flows",
            "TCP connections currently held by the reassembler",
        )?;
        registry.register(Box::new(active_flows.clone()))?;

        Ok(Self {
            parsed_packets: counter(
                registry,
                "sniffer_parsed_packets_total",
                "Packets decoded as IP/TCP and handed to the reassembler",
            )?,
            unparseable_packets: counter(
                registry,
                "sniffer_unparseable_packets_total",
                "Packets that failed decoding or carried no IP/TCP",
            )?,
            read_errors: counter(
                registry,
                "sniffer_read_errors_total",
                "Transient packet source read errors",
            )?,
            flows_flushed: counter(
                registry,
                "sniffer_flows_flushed_total",
                "Idle connections whose buffered data was flushed past gaps",
            )?,
            flows_closed: counter(
                registry,
                "sniffer_flows_closed_total",
                "Connections torn down after the close timeout",
            )?,
            active_flows,
        })
    }
}

impl PublishMetrics {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            events_published: counter(
                registry,
                "publish_events_published_total",
                "Events accepted by the telemetry sink",
            )?,
            events_dropped: counter(
                registry,
                "publish_events_dropped_total",
                "Events dropped because the outbound queue was full",
            )?,
            events_sampled_out: counter(
                registry,
                "publish_events_sampled_out_total",
                "Events discarded by sampling",
            )?,
            event_errors: counter(
                registry,
                "publish_event_errors_total",
                "Events that failed to send",
            )?,
            event_http_errors: counter(
                registry,
                "publish_event_http_errors_total",
                "Events rejected with a non-200 response",
            )?,
        })
    }
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let sniffer = SnifferMetrics::register(&registry)?;
        let publish = PublishMetrics::register(&registry)?;

        Ok(Self {
            registry,
            sniffer,
            publish,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorders_are_isolated() {
        let a = MetricsRecorder::new().unwrap();
        let b = MetricsRecorder::new().unwrap();

        a.sniffer.parsed_packets.inc();
        a.publish.events_dropped.inc_by(3);

        assert_eq!(a.sniffer.parsed_packets.get(), 1);
        assert_eq!(b.sniffer.parsed_packets.get(), 0);
        assert_eq!(b.publish.events_dropped.get(), 0);
    }

    #[test]
    fn cloned_handles_share_counters() {
        let recorder = MetricsRecorder::new().unwrap();
        let handle = recorder.publish.clone();
        handle.events_published.inc();
        assert_eq!(recorder.publish.events_published.get(), 1);
    }

    #[test]
    fn exposition_lists_counters() {
        let recorder = MetricsRecorder::new().unwrap();
        recorder.sniffer.unparseable_packets.inc();
        let text = recorder.gather_metrics().unwrap();
        assert!(text.contains("sniffer_unparseable_packets_total 1"));
        assert!(text.contains("publish_events_sampled_out_total 0"));
    }
}
