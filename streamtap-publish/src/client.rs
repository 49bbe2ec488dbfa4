//! Bounded sink client: a non-blocking submission queue drained by a
//! batching task.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use streamtap_config::PublishConfig;
use streamtap_telemetry::PublishMetrics;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

use crate::event::{Batch, Event};
use crate::response::Response;
use crate::transport::Transport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOptions {
    pub dataset: String,
    /// Keep one in `sample_rate` events. 1 keeps everything.
    pub sample_rate: u32,
    pub max_batch_size: usize,
    pub batch_timeout: Duration,
    pub pending_work_capacity: usize,
    pub response_capacity: usize,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self::from(&PublishConfig::default())
    }
}

impl From<&PublishConfig> for SinkOptions {
    fn from(config: &PublishConfig) -> Self {
        Self {
            dataset: config.dataset.clone(),
            sample_rate: config.sample_rate,
            max_batch_size: config.max_batch_size,
            batch_timeout: Duration::from_millis(config.batch_timeout_ms),
            pending_work_capacity: config.pending_work_capacity,
            response_capacity: config.response_capacity,
        }
    }
}

pub(crate) struct SinkClient {
    events: mpsc::Sender<Event>,
    metrics: PublishMetrics,
    sample_rate: u32,
    batcher: JoinHandle<()>,
}

impl SinkClient {
    pub(crate) fn start(
        options: &SinkOptions,
        transport: Arc<dyn Transport>,
        metrics: PublishMetrics,
        runtime: &Handle,
    ) -> (Self, mpsc::Receiver<Response>) {
        let (events, pending) = mpsc::channel(options.pending_work_capacity);
        let (responses, response_rx) = mpsc::channel(options.response_capacity);

        let batcher = runtime.spawn(run_batcher(
            pending,
            responses,
            transport,
            Arc::from(options.dataset.as_str()),
            options.max_batch_size,
            options.batch_timeout,
        ));

        let client = Self {
            events,
            metrics,
            sample_rate: options.sample_rate,
            batcher,
        };
        (client, response_rx)
    }

    /// Never blocks. Events that are sampled out or find the queue full are
    /// counted here, so the count does not depend on room in the response
    /// queue.
    pub(crate) fn send(&self, data: serde_json::Value, timestamp: DateTime<Utc>) {
        if self.sample_rate > 1 && !rand::rng().random_ratio(1, self.sample_rate) {
            self.metrics.events_sampled_out.inc();
            return;
        }

        let event = Event {
            timestamp,
            sample_rate: self.sample_rate,
            data,
        };
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                trace!("pending work queue full, event dropped");
                self.metrics.events_dropped.inc();
            }
            Err(TrySendError::Closed(_)) => {
                warn!(error = "publisher is shut down", "Error publishing event");
                self.metrics.event_errors.inc();
            }
        }
    }

    /// Closes the queue and waits for the last batch to be sent.
    pub(crate) async fn close(self) {
        let Self { events, batcher, .. } = self;
        drop(events);
        if let Err(e) = batcher.await {
            debug!(error = %e, "batcher task ended abnormally");
        }
    }
}

async fn run_batcher(
    mut pending: mpsc::Receiver<Event>,
    responses: mpsc::Sender<Response>,
    transport: Arc<dyn Transport>,
    dataset: Arc<str>,
    max_batch_size: usize,
    batch_timeout: Duration,
) {
    let mut batch = Vec::with_capacity(max_batch_size);
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            received = pending.recv() => match received {
                Some(event) => {
                    if batch.is_empty() {
                        deadline = Some(Instant::now() + batch_timeout);
                    }
                    batch.push(event);
                    if batch.len() >= max_batch_size {
                        deadline = None;
                        send(&*transport, &dataset, mem::take(&mut batch), &responses).await;
                    }
                }
                None => break,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                send(&*transport, &dataset, mem::take(&mut batch), &responses).await;
            }
        }
    }

    if !batch.is_empty() {
        send(&*transport, &dataset, batch, &responses).await;
    }
    debug!("batcher stopped");
}

async fn send(
    transport: &dyn Transport,
    dataset: &Arc<str>,
    events: Vec<Event>,
    responses: &mpsc::Sender<Response>,
) {
    let count = events.len();
    let batch = Batch {
        dataset: Arc::clone(dataset),
        events,
    };
    let results = transport.send_batch(batch).await;
    trace!(events = count, responses = results.len(), "batch sent");
    for response in results {
        if responses.send(response).await.is_err() {
            break;
        }
    }
}
