pub mod api;
pub mod config;
pub mod error;
pub mod eval;
pub mod execution;
pub mod grammar;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod schema;
