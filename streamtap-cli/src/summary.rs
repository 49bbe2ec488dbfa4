//! Built-in stream consumer: one event per connection with byte counts and
//! the reason it ended.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use streamtap_core::{
    CaptureContext, CloseReason, ConsumerFactory, Direction, FlowKey, Reassembled, StreamConsumer,
};
use streamtap_publish::Publisher;
use tracing::trace;

pub struct ConnectionSummaryFactory {
    publisher: Arc<dyn Publisher>,
    filter: String,
}

impl ConnectionSummaryFactory {
    pub fn new(publisher: Arc<dyn Publisher>, filter: impl Into<String>) -> Self {
        Self {
            publisher,
            filter: filter.into(),
        }
    }
}

impl ConsumerFactory for ConnectionSummaryFactory {
    fn bpf_filter(&self) -> String {
        self.filter.clone()
    }

    fn new_consumer(&mut self, key: &FlowKey, context: &CaptureContext) -> Box<dyn StreamConsumer> {
        Box::new(ConnectionSummary {
            key: *key,
            started: context.timestamp,
            last_seen: context.timestamp,
            bytes: [0; 2],
            chunks: [0; 2],
            skipped: [0; 2],
            publisher: Arc::clone(&self.publisher),
        })
    }
}

struct ConnectionSummary {
    key: FlowKey,
    started: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    bytes: [u64; 2],
    chunks: [u64; 2],
    skipped: [u64; 2],
    publisher: Arc<dyn Publisher>,
}

impl StreamConsumer for ConnectionSummary {
    fn reassembled(&mut self, chunk: Reassembled<'_>) {
        let side = chunk.direction.index();
        self.bytes[side] += chunk.bytes.len() as u64;
        self.skipped[side] += chunk.skipped;
        self.chunks[side] += 1;
        self.last_seen = self.last_seen.max(chunk.context.timestamp);
    }

    fn reassembly_complete(&mut self, reason: CloseReason) {
        let forward = Direction::Forward.index();
        let reverse = Direction::Reverse.index();
        trace!(flow = %self.key, reason = reason.as_str(), "connection complete");

        let event = json!({
            "connection": self.key.to_string(),
            "client_ip": self.key.net.source.to_string(),
            "client_port": self.key.transport.source_port,
            "server_ip": self.key.net.destination.to_string(),
            "server_port": self.key.transport.destination_port,
            "started": self.started.to_rfc3339(),
            "duration_ms": (self.last_seen - self.started).num_milliseconds(),
            "client_bytes": self.bytes[forward],
            "server_bytes": self.bytes[reverse],
            "client_chunks": self.chunks[forward],
            "server_chunks": self.chunks[reverse],
            "skipped_bytes": self.skipped[forward] + self.skipped[reverse],
            "close_reason": reason.as_str(),
        });
        self.publisher.publish(event, self.last_seen);
    }
}
