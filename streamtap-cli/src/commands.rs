use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use streamtap_capture::CaptureOptions;
use streamtap_config::{SourceType, StreamtapConfig};
use streamtap_engine::{Sniffer, SnifferError};
use streamtap_publish::{BufferedPublisher, Publisher, SinkOptions, WriterTransport};
use streamtap_telemetry::MetricsRecorder;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::summary::ConnectionSummaryFactory;

/// Reassembles TCP connections and publishes one event per connection.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Configuration file. Defaults to config/streamtap.yaml when present.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Packet source: pcap, af_packet or offline.
    #[arg(long)]
    pub source_type: Option<SourceType>,

    /// Interface to capture on. Empty or "any" captures on all interfaces.
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Replay a pcap file. Implies `--source-type offline`.
    #[arg(short = 'r', long)]
    pub pcap_file: Option<PathBuf>,

    #[arg(long)]
    pub snaplen: Option<u32>,

    /// Target size of the AF_PACKET ring in MiB.
    #[arg(long)]
    pub buffer_size_mb: Option<usize>,

    #[arg(long)]
    pub flush_timeout_secs: Option<u64>,

    /// BPF expression selecting the traffic to reassemble.
    #[arg(short, long, default_value = "tcp")]
    pub filter: String,

    #[arg(long)]
    pub dataset: Option<String>,

    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// "stdout" or a file to append events to.
    #[arg(short, long)]
    pub output: Option<String>,

    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// File configuration with command-line flags layered on top.
    pub fn load_config(&self) -> anyhow::Result<StreamtapConfig> {
        let mut config = match &self.config {
            Some(path) => StreamtapConfig::load_from_path(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => StreamtapConfig::load().context("loading configuration")?,
        };
        self.apply_overrides(&mut config);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut StreamtapConfig) {
        let capture = &mut config.capture;
        if let Some(path) = &self.pcap_file {
            capture.pcap_file = Some(path.clone());
            capture.source_type = SourceType::Offline;
        }
        if let Some(source_type) = self.source_type {
            capture.source_type = source_type;
        }
        if let Some(interface) = &self.interface {
            capture.device = interface.clone();
        }
        if let Some(snaplen) = self.snaplen {
            capture.snaplen = snaplen;
        }
        if let Some(size) = self.buffer_size_mb {
            capture.buffer_size_mb = size;
        }
        if let Some(timeout) = self.flush_timeout_secs {
            capture.flush_timeout_secs = timeout;
        }

        let publish = &mut config.publish;
        if let Some(dataset) = &self.dataset {
            publish.dataset = dataset.clone();
        }
        if let Some(rate) = self.sample_rate {
            publish.sample_rate = rate;
        }
        if let Some(output) = &self.output {
            publish.output = output.clone();
        }

        if let Some(level) = &self.log_level {
            config.telemetry.log_level = level.clone();
        }
    }
}

/// Runs the capture until the source is exhausted, then drains the
/// publisher.
#[instrument(skip_all)]
pub async fn run(config: StreamtapConfig, filter: &str) -> anyhow::Result<()> {
    let recorder = MetricsRecorder::new().context("registering metrics")?;
    let capture =
        CaptureOptions::try_from(&config.capture).context("invalid capture configuration")?;

    let transport = WriterTransport::for_output(&config.publish.output)
        .with_context(|| format!("opening output {}", config.publish.output))?;
    let publisher = Arc::new(BufferedPublisher::new(
        SinkOptions::from(&config.publish),
        Arc::new(transport),
        recorder.publish.clone(),
    )?);

    let factory = ConnectionSummaryFactory::new(
        Arc::clone(&publisher) as Arc<dyn Publisher>,
        filter,
    );
    let reporter = spawn_metrics_reporter(
        recorder.clone(),
        Duration::from_secs(config.telemetry.metrics_log_interval_secs),
    );

    info!(
        source = ?capture.source_type(),
        device = capture.device(),
        "starting capture"
    );
    let sniffer_metrics = recorder.sniffer.clone();
    let outcome = tokio::task::spawn_blocking(move || -> Result<(), SnifferError> {
        let mut sniffer = Sniffer::new(&capture, factory, sniffer_metrics)?;
        sniffer.run()
    })
    .await
    .context("processing loop panicked")?;

    if let Some(reporter) = reporter {
        reporter.abort();
    }
    match Arc::try_unwrap(publisher) {
        Ok(publisher) => publisher.shutdown().await,
        Err(_) => warn!("publisher still referenced, queued events were not flushed"),
    }
    outcome.context("capture failed")?;

    log_summary(&recorder);
    info!(
        "final metrics:\n{}",
        recorder.gather_metrics().context("gathering metrics")?
    );
    Ok(())
}

fn spawn_metrics_reporter(recorder: MetricsRecorder, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            log_summary(&recorder);
        }
    }))
}

fn log_summary(recorder: &MetricsRecorder) {
    let sniffer = &recorder.sniffer;
    let publish = &recorder.publish;
    info!(
        parsed = sniffer.parsed_packets.get(),
        unparseable = sniffer.unparseable_packets.get(),
        read_errors = sniffer.read_errors.get(),
        active_flows = sniffer.active_flows.get(),
        published = publish.events_published.get(),
        dropped = publish.events_dropped.get(),
        sampled_out = publish.events_sampled_out.get(),
        errors = publish.event_errors.get() + publish.event_http_errors.get(),
        "metrics"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_configuration() {
        let cli = Cli::try_parse_from([
            "streamtap",
            "-r",
            "/tmp/trace.pcap",
            "--snaplen",
            "1500",
            "--dataset",
            "mysql",
            "--sample-rate",
            "10",
            "-o",
            "/tmp/events.jsonl",
        ])
        .unwrap();
        let mut config = StreamtapConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.capture.source_type, SourceType::Offline);
        assert_eq!(
            config.capture.pcap_file.as_deref(),
            Some(std::path::Path::new("/tmp/trace.pcap"))
        );
        assert_eq!(config.capture.snaplen, 1500);
        assert_eq!(config.publish.dataset, "mysql");
        assert_eq!(config.publish.sample_rate, 10);
        assert_eq!(config.publish.output, "/tmp/events.jsonl");
        assert_eq!(cli.filter, "tcp");
    }

    #[test]
    fn unset_flags_keep_configuration() {
        let cli = Cli::try_parse_from(["streamtap"]).unwrap();
        let mut config = StreamtapConfig::default();
        cli.apply_overrides(&mut config);

        let defaults = StreamtapConfig::default();
        assert_eq!(config.capture.source_type, defaults.capture.source_type);
        assert_eq!(config.capture.snaplen, defaults.capture.snaplen);
        assert_eq!(config.publish.dataset, defaults.publish.dataset);
    }

    #[test]
    fn rejects_unknown_source_type() {
        assert!(Cli::try_parse_from(["streamtap", "--source-type", "pf_ring"]).is_err());
    }
}
