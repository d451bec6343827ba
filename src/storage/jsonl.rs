use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::sink::{SinkError, TelemetrySink, TelemetryRow};

/// Appends one JSON document per row to a file
pub struct JsonLinesSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it and its parent directory if needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!(path = %path.display(), "Writing telemetry");
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TelemetrySink for JsonLinesSink {
    fn record(&self, row: &TelemetryRow) -> Result<(), SinkError> {
        let line = serde_json::to_string(row)?;
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_appends_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry").join("rows.jsonl");

        let mut attributes = BTreeMap::new();
        attributes.insert("msecs".to_string(), Value::Float64(12.5));
        let row = TelemetryRow {
            checker: "https".to_string(),
            check_id: 7,
            timestamp: 1700000000,
            reason: "HTTP status 502".to_string(),
            attributes,
            named_results: BTreeMap::new(),
        };

        {
            let sink = JsonLinesSink::open(&path).unwrap();
            sink.record(&row).unwrap();
        }
        {
            let sink = JsonLinesSink::open(&path).unwrap();
            sink.record(&row).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: TelemetryRow = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, row);
    }
}
