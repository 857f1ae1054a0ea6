//! Eval cases: the built-in battery and JSON case files.

use crate::error::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A natural-language question with its known-correct SQL, or a question
/// that must be refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    pub name: String,
    pub query: String,
    #[serde(default)]
    pub reference_sql: Option<String>,
    /// Passed to the generator as "now" for relative time phrases
    #[serde(default)]
    pub reference_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expect_unsupported: bool,
}

impl EvalCase {
    pub fn new(name: &str, query: &str, reference_sql: &str) -> Self {
        Self {
            name: name.to_string(),
            query: query.to_string(),
            reference_sql: Some(reference_sql.to_string()),
            reference_time: None,
            expect_unsupported: false,
        }
    }

    pub fn unsupported(name: &str, query: &str) -> Self {
        Self {
            name: name.to_string(),
            query: query.to_string(),
            reference_sql: None,
            reference_time: None,
            expect_unsupported: true,
        }
    }

    pub fn at(mut self, reference_time: DateTime<Utc>) -> Self {
        self.reference_time = Some(reference_time);
        self
    }
}

/// 2024-06-15 12:00:00 UTC, the "now" of the time-relative cases.
pub fn fixed_reference_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

pub fn default_cases() -> Vec<EvalCase> {
    vec![
        EvalCase::new(
            "count_all",
            "Count all items",
            "SELECT COUNT(*) FROM order_items;",
        ),
        EvalCase::new(
            "total_revenue",
            "What is the total revenue?",
            "SELECT SUM(price) FROM order_items;",
        ),
        EvalCase::new(
            "avg_shipping",
            "What is the average shipping cost?",
            "SELECT AVG(freight_value) FROM order_items;",
        ),
        EvalCase::new(
            "count_expensive",
            "How many items cost more than 100?",
            "SELECT COUNT(*) FROM order_items WHERE price > 100;",
        ),
        EvalCase::new(
            "revenue_last_7_days",
            "What is the total revenue from items with shipping limit date in the last 7 days?",
            "SELECT SUM(price) FROM order_items WHERE shipping_limit_date > '2024-06-08 12:00:00';",
        )
        .at(fixed_reference_time()),
        EvalCase::unsupported("unsupported_weather", "What's the weather like in Tokyo?"),
        EvalCase::unsupported(
            "unsupported_nonexistent_table",
            "How many customers are from California?",
        ),
    ]
}

/// Load cases from a JSON array file.
pub fn load_cases(path: &Path) -> Result<Vec<EvalCase>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
