//! # streamtap-publish
//!
//! Backpressure-aware event publishing. Producers call
//! [`Publisher::publish`], which never blocks: events that do not fit the
//! bounded queue are dropped and counted. A batching task forwards queued
//! events to a [`Transport`], and a response task turns every delivery
//! outcome into a metric.

mod client;
mod error;
mod event;
mod publisher;
mod response;
pub mod transport;

pub use client::SinkOptions;
pub use error::PublishError;
pub use event::{Batch, Event};
pub use publisher::{BufferedPublisher, Publisher};
pub use response::{DeliveryOutcome, Response, SendError};
pub use transport::{Transport, WriterTransport};
