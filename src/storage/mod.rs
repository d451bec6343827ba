//! Telemetry persistence

pub mod jsonl;
pub mod memory;
pub mod sink;

pub use jsonl::JsonLinesSink;
pub use memory::{MemorySink, DEFAULT_ROWS_PER_CHECKER};
pub use sink::{MultiSink, SinkError, TelemetryRow, TelemetrySink};
