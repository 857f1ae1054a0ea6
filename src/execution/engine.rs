//! Execution Engine Trait - the contract the request path and the eval
//! harness execute SQL through.

use crate::error::Result;
use crate::execution::result::QueryResult;
use async_trait::async_trait;

#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Engine name (e.g., "tinybird")
    fn name(&self) -> &'static str;

    /// Execute one grammar-valid statement. A trailing `;` is accepted.
    async fn execute(&self, sql: &str) -> Result<QueryResult>;
}
