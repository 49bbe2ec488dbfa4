//! Per-event delivery results and their classification.

use bytes::Bytes;
use thiserror::Error;
use tracing::warn;

use streamtap_telemetry::PublishMetrics;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("queue overflow")]
    QueueOverflow,

    #[error("event dropped due to sampling")]
    Sampled,

    #[error("{0}")]
    Transport(String),
}

/// What happened to one submitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub error: Option<SendError>,
    pub status_code: u16,
    pub body: Bytes,
}

impl Response {
    pub fn accepted() -> Self {
        Self::with_status(200, Bytes::new())
    }

    pub fn with_status(status_code: u16, body: impl Into<Bytes>) -> Self {
        Self {
            error: None,
            status_code,
            body: body.into(),
        }
    }

    pub fn failed(error: SendError) -> Self {
        Self {
            error: Some(error),
            status_code: 0,
            body: Bytes::new(),
        }
    }

    pub fn outcome(&self) -> DeliveryOutcome {
        match &self.error {
            Some(SendError::QueueOverflow) => DeliveryOutcome::QueueOverflow,
            Some(SendError::Sampled) => DeliveryOutcome::SampledOut,
            Some(SendError::Transport(reason)) => DeliveryOutcome::SendFailed(reason.clone()),
            None if self.status_code != 200 => DeliveryOutcome::HttpError {
                status: self.status_code,
                body: self.body.clone(),
            },
            None => DeliveryOutcome::Published,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Published,
    QueueOverflow,
    SampledOut,
    HttpError { status: u16, body: Bytes },
    SendFailed(String),
}

/// Counts one response; remote and send failures are also logged.
pub(crate) fn record(metrics: &PublishMetrics, response: &Response) {
    match response.outcome() {
        DeliveryOutcome::Published => metrics.events_published.inc(),
        DeliveryOutcome::QueueOverflow => metrics.events_dropped.inc(),
        DeliveryOutcome::SampledOut => metrics.events_sampled_out.inc(),
        DeliveryOutcome::HttpError { status, body } => {
            warn!(
                http_status = status,
                body = %String::from_utf8_lossy(&body),
                "HTTP error publishing event"
            );
            metrics.event_http_errors.inc();
        }
        DeliveryOutcome::SendFailed(reason) => {
            warn!(error = %reason, "Error publishing event");
            metrics.event_errors.inc();
        }
    }
}
