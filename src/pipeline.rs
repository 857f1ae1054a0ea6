//! Request pipeline: schema fetch -> grammar synthesis -> generation ->
//! execution, strictly in that order. Nothing is cached between calls; every
//! request sees the live schema.

use crate::config::Config;
use crate::error::Result;
use crate::eval::{EvalCase, EvalHarness, EvalRun};
use crate::execution::{QueryEngine, QueryResult, TinybirdEngine};
use crate::grammar::{synthesize, SqlGrammar};
use crate::llm::{GenerationOutcome, LlmClient, SqlGenerator};
use crate::schema::{Catalog, Schema};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A question translated against the live schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    Sql(String),
    /// Refused by the generator; `hint` summarizes what can be asked instead
    Unsupported { reason: String, hint: String },
}

#[derive(Clone)]
pub struct NlSqlService {
    catalog: Arc<dyn Catalog>,
    engine: Arc<dyn QueryEngine>,
    generator: Arc<dyn SqlGenerator>,
}

impl NlSqlService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        engine: Arc<dyn QueryEngine>,
        generator: Arc<dyn SqlGenerator>,
    ) -> Self {
        Self {
            catalog,
            engine,
            generator,
        }
    }

    /// Tinybird serves as both catalog and engine; OpenAI as generator.
    pub fn from_config(config: &Config) -> Result<Self> {
        let tinybird = Arc::new(TinybirdEngine::from_config(config)?);
        let llm = Arc::new(LlmClient::from_config(config)?);
        info!(
            "Using Tinybird at {} and model {}",
            config.tinybird_host,
            llm.model()
        );
        Ok(Self::new(tinybird.clone(), tinybird, llm))
    }

    /// Fetch the live schema and compile its grammar.
    pub async fn load_grammar(&self) -> Result<(Schema, SqlGrammar)> {
        let started = Instant::now();
        let schema = self.catalog.fetch_schema().await?;
        let grammar = synthesize(&schema)?;
        debug!(
            "Grammar synthesized for {} tables / {} columns in {:?}",
            grammar.tables.len(),
            grammar.columns.len(),
            started.elapsed()
        );
        Ok((schema, grammar))
    }

    pub async fn translate(
        &self,
        question: &str,
        reference_time: DateTime<Utc>,
    ) -> Result<Translation> {
        let (schema, grammar) = self.load_grammar().await?;
        info!("Query received: {}", question);

        match self.generator.generate(question, &grammar, reference_time).await? {
            GenerationOutcome::Sql(sql) => Ok(Translation::Sql(sql)),
            GenerationOutcome::Unsupported { reason } => Ok(Translation::Unsupported {
                reason,
                hint: schema.user_hint(),
            }),
        }
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryResult> {
        debug!("Executing on {}: {}", self.engine.name(), sql);
        self.engine.execute(sql).await
    }

    /// Run the eval battery against the live schema.
    pub async fn run_evals(&self, cases: Vec<EvalCase>) -> Result<EvalRun> {
        let (_, grammar) = self.load_grammar().await?;
        let harness = EvalHarness::new(
            Arc::clone(&self.generator),
            Arc::clone(&self.engine),
            Arc::new(grammar),
        );
        Ok(harness.run(cases).await)
    }
}
