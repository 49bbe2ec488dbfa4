//! Interfaces between the reassembler and protocol-specific stream consumers.

use chrono::{DateTime, Utc};

use crate::FlowKey;

/// Capture metadata accompanying reassembled data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureContext {
    pub timestamp: DateTime<Utc>,
}

impl CaptureContext {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self { timestamp }
    }
}

/// Half of a connection.
///
/// `Forward` is the direction of the connection initiator when the handshake
/// was observed, otherwise the direction of the first observed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Reverse => 1,
        }
    }
}

/// Ordered bytes from one direction of a connection.
#[derive(Debug, Clone, Copy)]
pub struct Reassembled<'a> {
    pub direction: Direction,
    pub bytes: &'a [u8],
    /// Bytes lost before this chunk. Zero when contiguous with the previous
    /// chunk.
    pub skipped: u64,
    /// Capture context of the segment that carried these bytes.
    pub context: CaptureContext,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Both sides sent FIN and every byte up to them was delivered.
    Finished,
    Reset,
    /// No segment seen for the close timeout.
    Idle,
    /// The capture ended with the connection still open.
    Shutdown,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::Finished => "finished",
            CloseReason::Reset => "reset",
            CloseReason::Idle => "idle",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

/// Receives the reassembled streams of one connection.
pub trait StreamConsumer: Send {
    fn reassembled(&mut self, chunk: Reassembled<'_>);

    /// Called exactly once; no data follows.
    fn reassembly_complete(&mut self, reason: CloseReason);
}

/// Creates one consumer per connection.
pub trait ConsumerFactory {
    /// BPF expression matching the traffic this factory wants. Empty means
    /// everything.
    fn bpf_filter(&self) -> String;

    fn new_consumer(&mut self, key: &FlowKey, context: &CaptureContext) -> Box<dyn StreamConsumer>;
}
