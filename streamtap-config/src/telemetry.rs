//! Observability configuration.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Logging and metrics reporting.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TelemetryConfig {
    /// Default log filter, used when `RUST_LOG` is unset.
    #[validate(length(min = 1))]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Interval between metric snapshots in the log. Zero disables them.
    #[serde(default = "default_metrics_interval")]
    pub metrics_log_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_metrics_interval() -> u64 {
    60
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_log_interval_secs: default_metrics_interval(),
        }
    }
}
