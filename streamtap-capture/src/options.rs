use std::path::PathBuf;
use std::time::Duration;

use streamtap_config::{CaptureConfig, SourceType};

use crate::CaptureError;

/// Validated packet source parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    source_type: SourceType,
    device: String,
    snaplen: u32,
    buffer_size_mb: usize,
    flush_timeout: Duration,
    pcap_file: Option<PathBuf>,
}

impl CaptureOptions {
    pub fn new(
        source_type: SourceType,
        device: impl Into<String>,
        snaplen: u32,
        buffer_size_mb: usize,
        flush_timeout: Duration,
        pcap_file: Option<PathBuf>,
    ) -> Result<Self, CaptureError> {
        if snaplen == 0 {
            return Err(CaptureError::InvalidOptions(
                "snaplen must be greater than zero".into(),
            ));
        }
        if flush_timeout.is_zero() {
            return Err(CaptureError::InvalidOptions(
                "flush timeout must be greater than zero".into(),
            ));
        }
        if source_type == SourceType::Offline && pcap_file.is_none() {
            return Err(CaptureError::InvalidOptions(
                "offline capture requires a pcap file".into(),
            ));
        }
        if source_type == SourceType::AfPacket && buffer_size_mb == 0 {
            return Err(CaptureError::InvalidOptions(
                "af_packet capture requires a non-zero buffer size".into(),
            ));
        }

        Ok(Self {
            source_type,
            device: device.into(),
            snaplen,
            buffer_size_mb,
            flush_timeout,
            pcap_file,
        })
    }

    /// Offline replay of `path` with default sizing.
    pub fn offline(path: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let defaults = CaptureConfig::default();
        Self::new(
            SourceType::Offline,
            "",
            defaults.snaplen,
            defaults.buffer_size_mb,
            Duration::from_secs(defaults.flush_timeout_secs),
            Some(path.into()),
        )
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    /// Interface name. Empty selects every interface.
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn snaplen(&self) -> u32 {
        self.snaplen
    }

    pub fn buffer_size_mb(&self) -> usize {
        self.buffer_size_mb
    }

    pub fn flush_timeout(&self) -> Duration {
        self.flush_timeout
    }

    pub fn pcap_file(&self) -> Option<&PathBuf> {
        self.pcap_file.as_ref()
    }
}

impl TryFrom<&CaptureConfig> for CaptureOptions {
    type Error = CaptureError;

    fn try_from(config: &CaptureConfig) -> Result<Self, Self::Error> {
        Self::new(
            config.source_type,
            config.device.clone(),
            config.snaplen,
            config.buffer_size_mb,
            Duration::from_secs(config.flush_timeout_secs),
            config.pcap_file.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let options = CaptureOptions::try_from(&CaptureConfig::default()).unwrap();
        assert_eq!(options.source_type(), SourceType::Pcap);
        assert_eq!(options.device(), "");
        assert_eq!(options.flush_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn offline_without_file_is_rejected() {
        let config = CaptureConfig {
            source_type: SourceType::Offline,
            ..CaptureConfig::default()
        };
        assert!(matches!(
            CaptureOptions::try_from(&config),
            Err(CaptureError::InvalidOptions(_))
        ));
    }

    #[test]
    fn zero_snaplen_and_flush_are_rejected() {
        let zero_snaplen = CaptureConfig {
            snaplen: 0,
            ..CaptureConfig::default()
        };
        assert!(CaptureOptions::try_from(&zero_snaplen).is_err());

        let zero_flush = CaptureConfig {
            flush_timeout_secs: 0,
            ..CaptureConfig::default()
        };
        assert!(CaptureOptions::try_from(&zero_flush).is_err());
    }

    #[test]
    fn offline_helper_sets_path() {
        let options = CaptureOptions::offline("/tmp/trace.pcap").unwrap();
        assert_eq!(options.source_type(), SourceType::Offline);
        assert_eq!(
            options.pcap_file(),
            Some(&PathBuf::from("/tmp/trace.pcap"))
        );
    }
}
