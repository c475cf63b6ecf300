//! Performance-data writers: a bounded priority queue feeding exactly one worker
//! per writer, a long-lived output connection with exponential-backoff reconnect,
//! and byte/time-threshold batching. Three transports are provided -- line
//! protocol, HTTP(S) JSON bulk, and an OTLP-shaped export -- all sharing the same
//! `resume()`/`pause()`/stats contract from [`writer::PerfdataWriter`].

pub mod backoff;
pub mod engine;
pub mod error;
pub mod queue;
pub mod record;
pub mod sink;
pub mod sinks;
pub mod stats;
pub mod writer;

pub use engine::PerfdataEngine;
pub use error::{PerfdataError, PerfdataResult};
pub use record::PerfdataRecord;
pub use sink::OutputSink;
pub use stats::WriterStats;
pub use writer::{PerfdataWriter, WriterConfig};
