//! Verification Harness
//!
//! Runs every eval case concurrently (one task per case) and compares the
//! result of the generated SQL against the result of the hand-written
//! reference SQL. A failing case never affects its siblings: its failure is
//! recorded in its own [`EvalResult`] and the run carries on.

pub mod cases;
pub mod compare;

pub use cases::{default_cases, fixed_reference_time, load_cases, EvalCase};
pub use compare::{data_equal, row_order_for, values_equal, RowOrder};

use crate::execution::QueryEngine;
use crate::grammar::SqlGrammar;
use crate::llm::{GenerationOutcome, SqlGenerator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub name: String,
    pub passed: bool,
    pub query: String,
    pub reference_sql: String,
    pub generated_sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvalResult {
    fn pending(case: &EvalCase) -> Self {
        Self {
            name: case.name.clone(),
            passed: false,
            query: case.query.clone(),
            reference_sql: case.reference_sql.clone().unwrap_or_default(),
            generated_sql: String::new(),
            error: None,
        }
    }

    fn fail(mut self, error: String) -> Self {
        self.passed = false;
        self.error = Some(error);
        self
    }

    fn pass(mut self) -> Self {
        self.passed = true;
        self.error = None;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
}

/// Outcome of one harness run.
#[derive(Debug, Clone, Serialize)]
pub struct EvalRun {
    pub run_id: String,
    /// One result per case, in input order
    pub results: Vec<EvalResult>,
    /// Message of the first failed case, if any
    pub error: Option<String>,
}

impl EvalRun {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }

    pub fn summary(&self) -> EvalSummary {
        summarize(&self.results)
    }
}

pub fn summarize(results: &[EvalResult]) -> EvalSummary {
    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();
    let pass_rate = if total > 0 {
        passed as f64 / total as f64 * 100.0
    } else {
        0.0
    };

    EvalSummary {
        total,
        passed,
        failed: total - passed,
        pass_rate,
    }
}

fn first_failure(results: &[EvalResult]) -> Option<String> {
    results.iter().find(|r| !r.passed).map(|r| {
        format!(
            "eval {} failed: {}",
            r.name,
            r.error.as_deref().unwrap_or("unknown error")
        )
    })
}

pub fn log_results(results: &[EvalResult]) {
    for r in results {
        if r.passed {
            info!("PASS {}: {}", r.name, r.generated_sql);
        } else {
            warn!(
                "FAIL {}: {} (expected: {}, got: {})",
                r.name,
                r.error.as_deref().unwrap_or("unknown error"),
                r.reference_sql,
                r.generated_sql
            );
        }
    }

    let s = summarize(results);
    info!(
        "Eval summary: {}/{} passed, {} failed ({:.1}%)",
        s.passed, s.total, s.failed, s.pass_rate
    );
}

pub struct EvalHarness {
    generator: Arc<dyn SqlGenerator>,
    engine: Arc<dyn QueryEngine>,
    grammar: Arc<SqlGrammar>,
}

impl EvalHarness {
    pub fn new(
        generator: Arc<dyn SqlGenerator>,
        engine: Arc<dyn QueryEngine>,
        grammar: Arc<SqlGrammar>,
    ) -> Self {
        Self {
            generator,
            engine,
            grammar,
        }
    }

    pub async fn run(&self, cases: Vec<EvalCase>) -> EvalRun {
        let run_id = Uuid::new_v4().to_string();
        // Cases without their own reference time all share the run's start
        let now = Utc::now();
        let started = Instant::now();
        info!("Eval run {} starting: {} cases", run_id, cases.len());

        let mut tasks = Vec::with_capacity(cases.len());
        for case in cases {
            let pending = EvalResult::pending(&case);
            let generator = Arc::clone(&self.generator);
            let engine = Arc::clone(&self.engine);
            let grammar = Arc::clone(&self.grammar);
            let handle = tokio::spawn(async move {
                run_case(generator.as_ref(), engine.as_ref(), &grammar, &case, now).await
            });
            tasks.push((pending, handle));
        }

        let mut results = Vec::with_capacity(tasks.len());
        for (pending, handle) in tasks {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => pending.fail(format!("case task failed: {}", e)),
            };
            results.push(result);
        }

        let error = first_failure(&results);
        info!(
            "Eval run {} finished in {:?}: {}",
            run_id,
            started.elapsed(),
            if error.is_none() { "passed" } else { "failed" }
        );

        EvalRun {
            run_id,
            results,
            error,
        }
    }
}

/// Run one case to completion. Never returns an error: every failure is
/// folded into the returned result.
pub async fn run_case(
    generator: &dyn SqlGenerator,
    engine: &dyn QueryEngine,
    grammar: &SqlGrammar,
    case: &EvalCase,
    now: DateTime<Utc>,
) -> EvalResult {
    let reference_time = case.reference_time.unwrap_or(now);

    if case.expect_unsupported {
        return run_unsupported_case(generator, grammar, case, reference_time).await;
    }

    let mut result = EvalResult::pending(case);
    let reference_sql = match &case.reference_sql {
        Some(sql) => sql,
        None => return result.fail("missing reference SQL".to_string()),
    };

    let expected = match engine.execute(reference_sql).await {
        Ok(expected) => expected,
        Err(e) => return result.fail(format!("expected SQL failed: {}", e)),
    };

    let generated_sql = match generator.generate(&case.query, grammar, reference_time).await {
        Ok(GenerationOutcome::Sql(sql)) => sql,
        Ok(GenerationOutcome::Unsupported { reason }) => {
            result.generated_sql = format!("(refused: {})", reason);
            return result.fail(format!("unexpected refusal: {}", reason));
        }
        Err(e) => return result.fail(format!("generation failed: {}", e)),
    };
    result.generated_sql = generated_sql.clone();

    let actual = match engine.execute(&generated_sql).await {
        Ok(actual) => actual,
        Err(e) => return result.fail(format!("generated SQL failed: {}", e)),
    };

    if expected.row_count != actual.row_count {
        return result.fail(format!(
            "row count: expected {}, got {}",
            expected.row_count, actual.row_count
        ));
    }

    let order = row_order_for(reference_sql);
    debug!("Comparing {} rows for {} ({:?})", expected.row_count, case.name, order);
    if !data_equal(&expected.rows, &actual.rows, order) {
        return result.fail("data mismatch".to_string());
    }

    result.pass()
}

async fn run_unsupported_case(
    generator: &dyn SqlGenerator,
    grammar: &SqlGrammar,
    case: &EvalCase,
    reference_time: DateTime<Utc>,
) -> EvalResult {
    let mut result = EvalResult::pending(case);
    result.reference_sql = "(expected to be unsupported)".to_string();

    match generator.generate(&case.query, grammar, reference_time).await {
        Ok(GenerationOutcome::Unsupported { reason }) => {
            result.generated_sql = format!("(refused: {})", reason);
            result.pass()
        }
        Ok(GenerationOutcome::Sql(sql)) => {
            result.generated_sql = sql;
            result.fail("expected unsupported but got valid SQL".to_string())
        }
        Err(e) => result.fail(format!("expected unsupported but got: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, passed: bool) -> EvalResult {
        EvalResult {
            name: name.to_string(),
            passed,
            query: String::new(),
            reference_sql: String::new(),
            generated_sql: String::new(),
            error: if passed { None } else { Some("data mismatch".to_string()) },
        }
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            result("a", true),
            result("b", false),
            result("c", true),
            result("d", true),
        ];
        let s = summarize(&results);
        assert_eq!(s.total, 4);
        assert_eq!(s.passed, 3);
        assert_eq!(s.failed, 1);
        assert!((s.pass_rate - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_empty() {
        let s = summarize(&[]);
        assert_eq!(s.total, 0);
        assert_eq!(s.pass_rate, 0.0);
    }

    #[test]
    fn test_first_failure_in_input_order() {
        let mut results = vec![result("a", true), result("b", false), result("c", false)];
        results[2].error = Some("row count: expected 1, got 2".to_string());
        assert_eq!(
            first_failure(&results).as_deref(),
            Some("eval b failed: data mismatch")
        );
        assert_eq!(first_failure(&results[..1]), None);
    }

    #[test]
    fn test_result_serializes_without_empty_error() {
        let json = serde_json::to_value(result("a", true)).unwrap();
        assert!(json.get("error").is_none());
        let json = serde_json::to_value(result("b", false)).unwrap();
        assert_eq!(json["error"], "data mismatch");
    }
}
