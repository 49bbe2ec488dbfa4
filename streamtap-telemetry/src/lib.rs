//! # streamtap telemetry
//!
//! Logging initialisation and the metrics handles injected into the
//! capture pipeline and the event publisher.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::{MetricsRecorder, PublishMetrics, SnifferMetrics};
