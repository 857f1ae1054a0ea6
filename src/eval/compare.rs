//! Tolerant result-set comparison.
//!
//! Numbers are compared with a relative tolerance, everything else
//! structurally. Single-column rows compare only their value so that
//! `SELECT COUNT(*)` and `SELECT COUNT(*) AS total` agree.

use crate::execution::Row;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use sqlparser::ast::Statement;
use sqlparser::dialect::ClickHouseDialect;
use sqlparser::parser::Parser;

pub const RELATIVE_TOLERANCE: f64 = 1e-4;

lazy_static! {
    static ref QUOTED_NUMBER: Regex = Regex::new(r"^-?(0|[1-9][0-9]*)(\.[0-9]+)?$").unwrap();
}

/// How rows are matched between the reference and generated result sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    /// Row i must match row i
    Positional,
    /// Rows are matched as a multiset
    Unordered,
}

/// Numeric view of a scalar.
///
/// The engine quotes 64-bit integers and decimals, so strings that are plain
/// numeric literals count as numbers. A leading zero (`"01310"`) marks a code
/// rather than a quantity and keeps the value a string.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if QUOTED_NUMBER.is_match(s) => {
            s.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        if x == y {
            return true;
        }
        let diff = (x - y).abs();
        let avg = ((x + y) / 2.0).abs();
        if avg == 0.0 {
            return diff < RELATIVE_TOLERANCE;
        }
        return diff / avg < RELATIVE_TOLERANCE;
    }
    a == b
}

pub fn row_equal(a: &Row, b: &Row) -> bool {
    if a.len() == 1 && b.len() == 1 {
        return match (a.values().next(), b.values().next()) {
            (Some(x), Some(y)) => values_equal(x, y),
            _ => false,
        };
    }

    a.len() == b.len()
        && a.iter()
            .all(|(key, x)| b.get(key).map(|y| values_equal(x, y)).unwrap_or(false))
}

pub fn data_equal(expected: &[Row], actual: &[Row], order: RowOrder) -> bool {
    if expected.len() != actual.len() {
        return false;
    }

    match order {
        RowOrder::Positional => expected
            .iter()
            .zip(actual)
            .all(|(a, b)| row_equal(a, b)),
        RowOrder::Unordered => unordered_match(expected, actual),
    }
}

/// Find a one-to-one pairing of expected and actual rows. Tolerant equality is
/// not transitive, so a greedy first-fit can miss a pairing that exists; this
/// uses augmenting paths instead.
fn unordered_match(expected: &[Row], actual: &[Row]) -> bool {
    let candidates: Vec<Vec<usize>> = expected
        .iter()
        .map(|row| {
            (0..actual.len())
                .filter(|&j| row_equal(row, &actual[j]))
                .collect()
        })
        .collect();

    // owner[j] = expected row currently paired with actual row j
    let mut owner: Vec<Option<usize>> = vec![None; actual.len()];
    (0..expected.len()).all(|i| {
        let mut visited = vec![false; actual.len()];
        augment(i, &candidates, &mut owner, &mut visited)
    })
}

fn augment(
    i: usize,
    candidates: &[Vec<usize>],
    owner: &mut [Option<usize>],
    visited: &mut [bool],
) -> bool {
    for &j in &candidates[i] {
        if visited[j] {
            continue;
        }
        visited[j] = true;
        let free = match owner[j] {
            None => true,
            Some(other) => augment(other, candidates, owner, visited),
        };
        if free {
            owner[j] = Some(i);
            return true;
        }
    }
    false
}

/// Row order a reference query guarantees: positional when it sorts (or when
/// it cannot be parsed), unordered otherwise.
pub fn row_order_for(reference_sql: &str) -> RowOrder {
    match Parser::parse_sql(&ClickHouseDialect {}, reference_sql) {
        Ok(statements) => {
            let sorted = statements.iter().any(|statement| match statement {
                Statement::Query(query) => !query.order_by.is_empty(),
                _ => false,
            });
            if sorted {
                RowOrder::Positional
            } else {
                RowOrder::Unordered
            }
        }
        Err(_) => RowOrder::Positional,
    }
}
