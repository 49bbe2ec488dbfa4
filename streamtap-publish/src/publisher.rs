use std::sync::Arc;

use chrono::{DateTime, Utc};
use streamtap_telemetry::PublishMetrics;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use crate::client::{SinkClient, SinkOptions};
use crate::response::{self, Response};
use crate::transport::Transport;
use crate::PublishError;

/// Accepts events from stream consumers.
pub trait Publisher: Send + Sync {
    /// Never blocks and never fails; events that cannot be queued are dropped
    /// and counted.
    fn publish(&self, data: serde_json::Value, timestamp: DateTime<Utc>);
}

/// Publisher backed by a bounded queue, a batching task and a task that
/// turns delivery responses into metrics.
pub struct BufferedPublisher {
    client: SinkClient,
    responder: JoinHandle<()>,
}

impl BufferedPublisher {
    /// Must be called from within a tokio runtime.
    pub fn new(
        options: SinkOptions,
        transport: Arc<dyn Transport>,
        metrics: PublishMetrics,
    ) -> Result<Self, PublishError> {
        let runtime = Handle::try_current().map_err(|_| PublishError::NoRuntime)?;
        if options.max_batch_size == 0
            || options.pending_work_capacity == 0
            || options.response_capacity == 0
            || options.sample_rate == 0
        {
            return Err(PublishError::InvalidOptions(format!("{options:?}")));
        }

        let (client, responses) =
            SinkClient::start(&options, transport, metrics.clone(), &runtime);
        let responder = runtime.spawn(run_responder(responses, metrics));
        info!(
            dataset = %options.dataset,
            sample_rate = options.sample_rate,
            max_batch_size = options.max_batch_size,
            "publisher started"
        );
        Ok(Self { client, responder })
    }

    /// Sends what is queued and waits until every response is counted.
    #[instrument(skip_all)]
    pub async fn shutdown(self) {
        self.client.close().await;
        if let Err(e) = self.responder.await {
            debug!(error = %e, "responder task ended abnormally");
        }
    }
}

impl Publisher for BufferedPublisher {
    fn publish(&self, data: serde_json::Value, timestamp: DateTime<Utc>) {
        self.client.send(data, timestamp);
    }
}

async fn run_responder(mut responses: mpsc::Receiver<Response>, metrics: PublishMetrics) {
    while let Some(response) = responses.recv().await {
        response::record(&metrics, &response);
    }
    debug!("responder stopped");
}
