//! Constrained Query Generator
//!
//! Drives the OpenAI Responses API with two tools: `sql_generator`, a custom
//! tool whose output is constrained by the synthesized Lark grammar, and
//! `cannot_answer`, a plain function tool for refusals. Which tool the model
//! calls decides the [`GenerationOutcome`].

use crate::config::{http_client, Config};
use crate::error::{Nl2SqlError, Result};
use crate::grammar::SqlGrammar;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info, warn};

pub const SQL_TOOL: &str = "sql_generator";
pub const REFUSAL_TOOL: &str = "cannot_answer";

/// Used when the model refused but its refusal payload was unreadable.
pub const GENERIC_REFUSAL: &str = "Query cannot be answered with available data";

const REFUSAL_DESCRIPTION: &str = "Call this when the query cannot be answered with the available database schema. Use this for questions about data that doesn't exist in the tables, or for completely unrelated questions.";

/// Result of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Grammar-constrained SQL, including the trailing `;`
    Sql(String),
    /// The model declined to answer with the available schema
    Unsupported { reason: String },
}

/// Anything that can turn a question into a [`GenerationOutcome`].
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// `reference_time` stands in for "now" when resolving relative time
    /// phrases; implementations must not read the wall clock themselves.
    async fn generate(
        &self,
        question: &str,
        grammar: &SqlGrammar,
        reference_time: DateTime<Utc>,
    ) -> Result<GenerationOutcome>;
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: String,
    tools: Vec<Tool<'a>>,
    parallel_tool_calls: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Tool<'a> {
    Custom {
        name: &'a str,
        description: &'a str,
        format: ToolFormat<'a>,
    },
    Function {
        name: &'a str,
        description: &'a str,
        parameters: serde_json::Value,
    },
}

#[derive(Debug, Serialize)]
struct ToolFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    syntax: &'static str,
    definition: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ResponsesResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
pub struct OutputItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Custom tool payload
    #[serde(default)]
    pub input: Option<String>,
    /// Function tool payload (JSON string)
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefusalArguments {
    reason: String,
}

pub fn format_reference_time(reference_time: DateTime<Utc>) -> String {
    reference_time.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn build_prompt(question: &str, reference_time: DateTime<Utc>) -> String {
    let now = format_reference_time(reference_time);
    format!(
        r#"Convert this natural language query to a valid ClickHouse SQL query.

If the query CAN be answered with the available schema, call the {sql_tool} tool.
If the query CANNOT be answered (asks for data not in the schema, or is unrelated to the database), call the {refusal_tool} tool with a brief explanation.

Current UTC time: {now}
Use this timestamp for any relative time calculations (e.g., 'last 30 hours' means since {now} minus 30 hours).

Query: {question}"#,
        sql_tool = SQL_TOOL,
        refusal_tool = REFUSAL_TOOL,
        now = now,
        question = question,
    )
}

fn build_request<'a>(
    model: &'a str,
    question: &str,
    grammar: &'a SqlGrammar,
    reference_time: DateTime<Utc>,
) -> ResponsesRequest<'a> {
    ResponsesRequest {
        model,
        input: build_prompt(question, reference_time),
        tools: vec![
            Tool::Custom {
                name: SQL_TOOL,
                description: &grammar.description,
                format: ToolFormat {
                    kind: "grammar",
                    syntax: "lark",
                    definition: &grammar.definition,
                },
            },
            Tool::Function {
                name: REFUSAL_TOOL,
                description: REFUSAL_DESCRIPTION,
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "reason": {
                            "type": "string",
                            "description": "Brief explanation of why this query cannot be answered"
                        }
                    },
                    "required": ["reason"]
                }),
            },
        ],
        parallel_tool_calls: false,
    }
}

/// Decide the outcome from the tool the model chose.
pub fn interpret_response(response: &ResponsesResponse) -> Result<GenerationOutcome> {
    for item in &response.output {
        let name = item.name.as_deref();

        if item.kind == "custom_tool_call" && name == Some(SQL_TOOL) {
            return match item.input.as_deref() {
                Some(sql) if !sql.trim().is_empty() => Ok(GenerationOutcome::Sql(sql.to_string())),
                _ => Err(Nl2SqlError::GenerationService(format!(
                    "{} call carried no input (response {})",
                    SQL_TOOL, response.id
                ))),
            };
        }

        if item.kind == "function_call" && name == Some(REFUSAL_TOOL) {
            let payload = item.arguments.as_deref().or(item.input.as_deref());
            let reason = payload
                .and_then(|raw| serde_json::from_str::<RefusalArguments>(raw).ok())
                .map(|args| args.reason.trim().to_string())
                .filter(|reason| !reason.is_empty())
                .unwrap_or_else(|| {
                    warn!("Unreadable {} payload: {:?}", REFUSAL_TOOL, payload);
                    GENERIC_REFUSAL.to_string()
                });
            return Ok(GenerationOutcome::Unsupported { reason });
        }
    }

    Err(Nl2SqlError::GenerationService(format!(
        "no output produced (response {})",
        response.id
    )))
}

#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Result<Self> {
        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: http_client()?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.openai_api_key.clone(),
            config.openai_model.clone(),
            config.openai_base_url.clone(),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call_responses(&self, request: &ResponsesRequest<'_>) -> Result<ResponsesResponse> {
        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| Nl2SqlError::GenerationService(format!("request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Nl2SqlError::GenerationService(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Nl2SqlError::GenerationService(format!(
                "openai error ({}): {}",
                status.as_u16(),
                body
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| Nl2SqlError::GenerationService(format!("failed to parse response: {}", e)))
    }
}

#[async_trait]
impl SqlGenerator for LlmClient {
    async fn generate(
        &self,
        question: &str,
        grammar: &SqlGrammar,
        reference_time: DateTime<Utc>,
    ) -> Result<GenerationOutcome> {
        let request = build_request(&self.model, question, grammar, reference_time);
        debug!(
            "Calling {} with grammar constraint ({} bytes), reference time {}",
            self.model,
            grammar.definition.len(),
            format_reference_time(reference_time)
        );

        let started = Instant::now();
        let response = self.call_responses(&request).await?;
        let outcome = interpret_response(&response)?;

        match &outcome {
            GenerationOutcome::Sql(sql) => {
                info!("SQL generated in {:?}: {}", started.elapsed(), sql)
            }
            GenerationOutcome::Unsupported { reason } => {
                info!("Query refused in {:?}: {}", started.elapsed(), reason)
            }
        }

        Ok(outcome)
    }
}
