//! Tinybird Execution Engine
//!
//! Tinybird fronts ClickHouse with a REST API. It is used both as the catalog
//! (`GET /v0/datasources`) and as the query engine (`GET /v0/sql?q=...`).

use crate::config::{http_client, Config};
use crate::error::{Nl2SqlError, Result};
use crate::execution::engine::QueryEngine;
use crate::execution::result::{QueryResult, Row};
use crate::schema::{Catalog, Column, Schema, Table};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, info};

/// Output format directive appended to every query.
const OUTPUT_FORMAT: &str = "FORMAT JSON";

pub struct TinybirdEngine {
    host: String,
    token: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct SqlResponse {
    #[serde(default)]
    meta: Vec<ColumnMeta>,
    data: Vec<Row>,
    rows: usize,
}

#[derive(Debug, Deserialize)]
struct ColumnMeta {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DatasourcesResponse {
    datasources: Vec<Table>,
}

/// Strip one trailing statement terminator and append the output format.
///
/// The SQL API rejects `;` in front of a `FORMAT` clause.
pub fn prepare_sql(sql: &str) -> String {
    let trimmed = sql.trim();
    let statement = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    format!("{} {}", statement, OUTPUT_FORMAT)
}

impl TinybirdEngine {
    pub fn new(host: String, token: String) -> Result<Self> {
        let client = http_client()?;

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.tinybird_host.clone(), config.tinybird_token.clone())
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> std::result::Result<(u16, String), reqwest::Error> {
        let mut request = self
            .client
            .get(format!("{}{}", self.host, path))
            .bearer_auth(&self.token);
        if !query.is_empty() {
            request = request.query(query);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl Catalog for TinybirdEngine {
    async fn fetch_schema(&self) -> Result<Schema> {
        let started = Instant::now();
        let (status, body) = self
            .get("/v0/datasources", &[])
            .await
            .map_err(|e| Nl2SqlError::SchemaFetch(format!("failed to fetch datasources: {}", e)))?;

        if !(200..300).contains(&status) {
            return Err(Nl2SqlError::SchemaFetch(format!(
                "tinybird error ({}): {}",
                status, body
            )));
        }

        let parsed: DatasourcesResponse = serde_json::from_str(&body)
            .map_err(|e| Nl2SqlError::SchemaFetch(format!("failed to parse response: {}", e)))?;

        let schema = Schema::new(
            parsed
                .datasources
                .into_iter()
                .map(|ds| {
                    let columns = ds
                        .columns
                        .into_iter()
                        .map(|c| Column::new(c.name, c.column_type))
                        .collect();
                    Table::new(ds.name, columns)
                })
                .collect(),
        );

        info!(
            "Schema loaded: {} tables, {} columns in {:?}",
            schema.tables.len(),
            schema.column_count(),
            started.elapsed()
        );
        for table in &schema.tables {
            debug!("Table loaded: {} ({} columns)", table.name, table.columns.len());
        }
        Ok(schema)
    }
}

#[async_trait]
impl QueryEngine for TinybirdEngine {
    fn name(&self) -> &'static str {
        "tinybird"
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let started = Instant::now();
        let query = prepare_sql(sql);
        debug!("Executing query on Tinybird: {}", query);

        let (status, body) = self
            .get("/v0/sql", &[("q", query.as_str())])
            .await
            .map_err(|e| Nl2SqlError::QueryTransport(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(Nl2SqlError::Execution { status, body });
        }

        let parsed: SqlResponse = serde_json::from_str(&body).map_err(|e| Nl2SqlError::Execution {
            status,
            body: format!("failed to parse response: {}", e),
        })?;

        let mut result = QueryResult::new(
            parsed.meta.into_iter().map(|m| m.name).collect(),
            parsed.data,
            parsed.rows,
        );
        result.execution_time_ms = started.elapsed().as_millis() as u64;

        info!(
            "Query executed: {} rows in {}ms",
            result.row_count, result.execution_time_ms
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_sql_strips_terminator() {
        assert_eq!(
            prepare_sql("SELECT COUNT(*) FROM order_items;"),
            "SELECT COUNT(*) FROM order_items FORMAT JSON"
        );
        assert_eq!(
            prepare_sql("  SELECT price FROM order_items LIMIT 5 ;  \n"),
            "SELECT price FROM order_items LIMIT 5 FORMAT JSON"
        );
    }

    #[test]
    fn test_prepare_sql_strips_only_one_terminator() {
        assert_eq!(prepare_sql("SELECT 1;;"), "SELECT 1; FORMAT JSON");
    }

    #[test]
    fn test_prepare_sql_without_terminator() {
        assert_eq!(
            prepare_sql("SELECT SUM(price) FROM order_items"),
            "SELECT SUM(price) FROM order_items FORMAT JSON"
        );
    }

    #[test]
    fn test_host_trailing_slash_trimmed() {
        let engine = TinybirdEngine::new("https://api.tinybird.co/".into(), "tok".into()).unwrap();
        assert_eq!(engine.host, "https://api.tinybird.co");
        assert_eq!(engine.name(), "tinybird");
    }
}
