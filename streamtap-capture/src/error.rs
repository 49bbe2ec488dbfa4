use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid capture options: {0}")]
    InvalidOptions(String),

    #[error("ring buffer of {target_mb} MB cannot hold one block of {block_size} bytes")]
    BufferTooSmall { target_mb: usize, block_size: usize },

    #[error("pcap error: {0}")]
    Pcap(#[from] pcap::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to apply capture filter '{expression}': {reason}")]
    Filter { expression: String, reason: String },

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("packet read failed: {0}")]
    Read(String),
}
