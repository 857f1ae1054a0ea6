//! Schema model discovered from the catalog service.

use crate::error::Result;
use async_trait::async_trait;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// A queryable table (a Tinybird datasource). Columns keep catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<Table>,
}

impl Schema {
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }

    /// Short, user-facing summary of what can be asked about.
    pub fn user_hint(&self) -> String {
        if self.is_empty() {
            return "No data available.".to_string();
        }

        let parts = self
            .tables
            .iter()
            .map(|t| {
                let columns = t.columns.iter().map(|c| c.name.as_str()).sorted().join(", ");
                format!("{} ({})", t.name, columns)
            })
            .sorted()
            .join("; ");

        format!("Available data: {}", parts)
    }
}

/// Source of table/column metadata.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn fetch_schema(&self) -> Result<Schema>;
}
