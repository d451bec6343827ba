use std::collections::VecDeque;

use dashmap::DashMap;

use super::sink::{SinkError, TelemetrySink, TelemetryRow};

/// Default number of rows retained per checker
pub const DEFAULT_ROWS_PER_CHECKER: usize = 1024;

/// Keeps the most recent rows per checker in memory
#[derive(Debug)]
pub struct MemorySink {
    rows: DashMap<String, VecDeque<TelemetryRow>>,
    max_rows_per_checker: usize,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(DEFAULT_ROWS_PER_CHECKER)
    }
}

impl MemorySink {
    pub fn new(max_rows_per_checker: usize) -> Self {
        Self {
            rows: DashMap::new(),
            max_rows_per_checker: max_rows_per_checker.max(1),
        }
    }

    /// Retained rows for a checker, oldest first
    pub fn rows(&self, checker: &str) -> Vec<TelemetryRow> {
        self.rows
            .get(checker)
            .map(|rows| rows.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Checker names with retained rows, sorted
    pub fn checkers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rows.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn total_rows(&self) -> usize {
        self.rows.iter().map(|e| e.value().len()).sum()
    }
}

impl TelemetrySink for MemorySink {
    fn record(&self, row: &TelemetryRow) -> Result<(), SinkError> {
        let mut rows = self.rows.entry(row.checker.clone()).or_default();
        if rows.len() >= self.max_rows_per_checker {
            rows.pop_front();
        }
        rows.push_back(row.clone());
        Ok(())
    }
}
