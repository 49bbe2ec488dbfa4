//! Event publisher configuration.
//!
//! Sizes the bounded sink queue and the batching that feeds the transport.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Telemetry sink configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct PublishConfig {
    /// Dataset name stamped on every batch.
    #[validate(length(min = 1, max = 256))]
    #[serde(default = "default_dataset")]
    pub dataset: String,

    /// Keep one event out of every `sample_rate`.
    #[validate(range(min = 1))]
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Maximum events per transmitted batch.
    #[validate(range(min = 1, max = 10000))]
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Longest time an incomplete batch waits before it is sent.
    #[validate(range(min = 1, max = 60000))]
    #[serde(default = "default_batch_timeout")]
    pub batch_timeout_ms: u64,

    /// Capacity of the outbound event queue. Events beyond it are dropped.
    #[validate(range(min = 1, max = 10_000_000))]
    #[serde(default = "default_pending_work_capacity")]
    pub pending_work_capacity: usize,

    /// Capacity of the delivery response queue.
    #[validate(range(min = 1, max = 20_000_000))]
    #[serde(default = "default_response_capacity")]
    pub response_capacity: usize,

    /// Where batches are written: `stdout` or a file path.
    #[validate(custom(function = validation::validate_output))]
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_dataset() -> String {
    "tcp".into()
}

fn default_sample_rate() -> u32 {
    1
}

fn default_max_batch_size() -> usize {
    50
}

fn default_batch_timeout() -> u64 {
    100
}

fn default_pending_work_capacity() -> usize {
    10_000
}

fn default_response_capacity() -> usize {
    20_000
}

fn default_output() -> String {
    "stdout".into()
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset(),
            sample_rate: default_sample_rate(),
            max_batch_size: default_max_batch_size(),
            batch_timeout_ms: default_batch_timeout(),
            pending_work_capacity: default_pending_work_capacity(),
            response_capacity: default_response_capacity(),
            output: default_output(),
        }
    }
}
