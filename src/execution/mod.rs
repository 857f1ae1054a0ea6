//! Query execution against the columnar query service.

pub mod engine;
pub mod result;
pub mod tinybird;

pub use engine::QueryEngine;
pub use result::{QueryResult, Row};
pub use tinybird::TinybirdEngine;
