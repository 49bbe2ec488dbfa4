//! # streamtap-core
//!
//! Stream reassembly for the capture pipeline.
//!
//! ### Key Submodules:
//! - `reassembly`: per-connection reassembly with time based eviction
//! - `consumer`: traits protocol consumers implement to receive streams
//! - `flow`: connection keys

pub mod consumer;
pub mod flow;
pub mod reassembly;

pub use consumer::{
    CaptureContext, CloseReason, ConsumerFactory, Direction, Reassembled, StreamConsumer,
};
pub use flow::FlowKey;
pub use reassembly::{FlushStats, Reassembler, ReassemblyOptions};

pub mod prelude {
    pub use crate::consumer::*;
    pub use crate::flow::FlowKey;
    pub use crate::reassembly::{FlushStats, Reassembler, ReassemblyOptions};
}
