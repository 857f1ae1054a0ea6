#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nl2sql::error::{Nl2SqlError, Result};
use nl2sql::execution::{QueryEngine, QueryResult, Row};
use nl2sql::grammar::SqlGrammar;
use nl2sql::llm::{GenerationOutcome, SqlGenerator};
use nl2sql::schema::{Catalog, Column, Schema, Table};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub fn order_items_schema() -> Schema {
    Schema::new(vec![Table::new(
        "order_items",
        vec![
            Column::new("order_id", "String"),
            Column::new("order_item_id", "Int32"),
            Column::new("product_id", "String"),
            Column::new("seller_id", "String"),
            Column::new("shipping_limit_date", "DateTime"),
            Column::new("price", "Float64"),
            Column::new("freight_value", "Float64"),
        ],
    )])
}

pub fn rows(value: Value) -> Vec<Row> {
    value
        .as_array()
        .expect("array of rows")
        .iter()
        .map(|r| r.as_object().expect("row object").clone())
        .collect()
}

pub fn result(value: Value) -> QueryResult {
    let rows = rows(value);
    let count = rows.len();
    QueryResult::new(vec![], rows, count)
}

fn normalize(sql: &str) -> String {
    sql.trim().trim_end_matches(';').trim().to_string()
}

pub struct FakeCatalog {
    pub schema: Option<Schema>,
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn fetch_schema(&self) -> Result<Schema> {
        self.schema
            .clone()
            .ok_or_else(|| Nl2SqlError::SchemaFetch("catalog unreachable".to_string()))
    }
}

/// Engine answering from a fixed SQL -> result table. Unknown SQL is rejected
/// the way the real engine rejects a bad query.
#[derive(Default)]
pub struct FakeEngine {
    results: HashMap<String, QueryResult>,
    pub executed: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn with(mut self, sql: &str, result: QueryResult) -> Self {
        self.results.insert(normalize(sql), result);
        self
    }
}

#[async_trait]
impl QueryEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.executed.lock().unwrap().push(sql.to_string());
        self.results
            .get(&normalize(sql))
            .cloned()
            .ok_or_else(|| Nl2SqlError::Execution {
                status: 400,
                body: format!("unknown query: {}", sql),
            })
    }
}

pub enum Scripted {
    Sql(String),
    Refuse(String),
    Fail(String),
    Panic,
}

/// Generator answering from a question -> scripted reply table, with an
/// optional per-question delay. Records the reference time of every call.
#[derive(Default)]
pub struct FakeGenerator {
    replies: HashMap<String, (Scripted, Duration)>,
    pub calls: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl FakeGenerator {
    pub fn reply(mut self, question: &str, reply: Scripted) -> Self {
        self.replies.insert(question.to_string(), (reply, Duration::ZERO));
        self
    }

    pub fn reply_after(mut self, question: &str, reply: Scripted, delay: Duration) -> Self {
        self.replies.insert(question.to_string(), (reply, delay));
        self
    }

    pub fn reference_time_for(&self, question: &str) -> Option<DateTime<Utc>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(q, _)| q == question)
            .map(|(_, t)| *t)
    }
}

#[async_trait]
impl SqlGenerator for FakeGenerator {
    async fn generate(
        &self,
        question: &str,
        _grammar: &SqlGrammar,
        reference_time: DateTime<Utc>,
    ) -> Result<GenerationOutcome> {
        self.calls
            .lock()
            .unwrap()
            .push((question.to_string(), reference_time));

        let (reply, delay) = self
            .replies
            .get(question)
            .ok_or_else(|| Nl2SqlError::GenerationService("no output produced".to_string()))?;
        if !delay.is_zero() {
            tokio::time::sleep(*delay).await;
        }

        match reply {
            Scripted::Sql(sql) => Ok(GenerationOutcome::Sql(sql.clone())),
            Scripted::Refuse(reason) => Ok(GenerationOutcome::Unsupported {
                reason: reason.clone(),
            }),
            Scripted::Fail(message) => Err(Nl2SqlError::GenerationService(message.clone())),
            Scripted::Panic => panic!("generator blew up"),
        }
    }
}
