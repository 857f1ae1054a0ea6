//! Query Result - normalized tabular response from the query engine

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result row: column/alias name -> scalar (number, string, bool or null)
pub type Row = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in engine order
    #[serde(default)]
    pub columns: Vec<String>,

    pub rows: Vec<Row>,

    /// Row count as reported by the engine, not recomputed from `rows`
    pub row_count: usize,

    /// Wall time of the engine call in milliseconds
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>, row_count: usize) -> Self {
        Self {
            columns,
            rows,
            row_count,
            execution_time_ms: 0,
        }
    }

    /// Column order for display: engine metadata when present, otherwise the
    /// keys of the first row.
    pub fn column_names(&self) -> Vec<String> {
        if !self.columns.is_empty() {
            return self.columns.clone();
        }
        self.rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }
}
