//! Telemetry rows and the sink capability

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::checks::{Check, CheckResult, Telemetry};
use crate::data::Value;

/// One completed probe execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow {
    /// Check kind, used as the table name
    pub checker: String,
    pub check_id: u64,
    /// Unix timestamp of the execution
    pub timestamp: i64,
    /// Failure reason, empty on success
    pub reason: String,
    pub attributes: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub named_results: BTreeMap<String, BTreeMap<String, Value>>,
}

impl TelemetryRow {
    pub fn new(check: &Check, timestamp: i64, result: &CheckResult, telemetry: Telemetry) -> Self {
        Self {
            checker: check.checker_name().to_string(),
            check_id: check.id().as_u64(),
            timestamp,
            reason: result.reason().to_string(),
            attributes: telemetry.attributes,
            named_results: telemetry.named_results,
        }
    }
}

/// Destination for telemetry rows. Failures are reported, never fatal.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, row: &TelemetryRow) -> Result<(), SinkError>;
}

/// Forwards every row to each inner sink, attempting all of them
pub struct MultiSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }
}

impl TelemetrySink for MultiSink {
    /// Returns the first error after every sink has been tried
    fn record(&self, row: &TelemetryRow) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.record(row) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Telemetry sink errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemorySink;

    struct BrokenSink;

    impl TelemetrySink for BrokenSink {
        fn record(&self, _row: &TelemetryRow) -> Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }
    }

    #[test]
    fn test_multi_sink_tries_every_sink() {
        let memory = Arc::new(MemorySink::default());
        let sink = MultiSink::new(vec![
            Arc::new(BrokenSink) as Arc<dyn TelemetrySink>,
            memory.clone() as Arc<dyn TelemetrySink>,
        ]);
        let row = TelemetryRow {
            checker: "dns".to_string(),
            check_id: 1,
            timestamp: 10,
            reason: String::new(),
            attributes: BTreeMap::new(),
            named_results: BTreeMap::new(),
        };

        assert!(sink.record(&row).is_err());
        assert_eq!(memory.rows("dns"), vec![row]);
    }
}
