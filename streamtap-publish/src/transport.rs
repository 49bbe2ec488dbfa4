//! Where batches go.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::event::{Batch, Event};
use crate::response::{Response, SendError};

/// Delivers a batch and reports one response per event, in batch order.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_batch(&self, batch: Batch) -> Vec<Response>;
}

#[derive(Serialize)]
struct Line<'a> {
    dataset: &'a str,
    #[serde(flatten)]
    event: &'a Event,
}

/// Writes every event as one JSON line.
pub struct WriterTransport {
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl WriterTransport {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    /// Appends to `path`, creating it when missing.
    pub fn append_to(path: &Path) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(tokio::fs::File::from_std(file)))
    }

    /// `stdout` or a file path.
    pub fn for_output(output: &str) -> io::Result<Self> {
        match output {
            "stdout" | "-" => Ok(Self::stdout()),
            path => Self::append_to(Path::new(path)),
        }
    }
}

#[async_trait]
impl Transport for WriterTransport {
    async fn send_batch(&self, batch: Batch) -> Vec<Response> {
        let mut buffer = Vec::new();
        let mut responses = Vec::with_capacity(batch.len());
        for event in &batch.events {
            let line = Line {
                dataset: &batch.dataset,
                event,
            };
            match serde_json::to_writer(&mut buffer, &line) {
                Ok(()) => {
                    buffer.push(b'\n');
                    responses.push(Response::accepted());
                }
                Err(e) => responses.push(Response::failed(SendError::Transport(e.to_string()))),
            }
        }

        let mut writer = self.writer.lock().await;
        let written = match writer.write_all(&buffer).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let failure = Response::failed(SendError::Transport(e.to_string()));
            responses.fill(failure);
        }
        responses
    }
}
