//! Environment-driven configuration.

use crate::error::{Nl2SqlError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-5";
pub const DEFAULT_PORT: u16 = 8080;

/// Connect timeout shared by the generation and query service clients.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client used for every outbound service call.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| Nl2SqlError::Config(format!("failed to create HTTP client: {}", e)))
}

#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub tinybird_host: String,
    pub tinybird_token: String,
    pub port: u16,
    /// Directory served for every path outside `/api`
    pub static_dir: PathBuf,
    /// Run the eval battery before the server starts accepting requests
    pub startup_evals: bool,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Every missing required variable is reported in a single error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut missing = Vec::new();
        let mut required = |key: &'static str| {
            let value = get(key);
            if value.is_none() {
                missing.push(key);
            }
            value.unwrap_or_default()
        };

        let openai_api_key = required("OPENAI_API_KEY");
        let tinybird_host = required("TINYBIRD_HOST");
        let tinybird_token = required("TINYBIRD_TOKEN");

        if !missing.is_empty() {
            return Err(Nl2SqlError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| Nl2SqlError::Config(format!("invalid PORT '{}': {}", raw, e)))?,
            None => DEFAULT_PORT,
        };

        let startup_evals = match get("STARTUP_EVALS") {
            Some(raw) => parse_flag(&raw).ok_or_else(|| {
                Nl2SqlError::Config(format!("invalid STARTUP_EVALS '{}'", raw))
            })?,
            None => true,
        };

        Ok(Self {
            openai_api_key,
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            tinybird_host: tinybird_host.trim_end_matches('/').to_string(),
            tinybird_token,
            port,
            static_dir: get("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("frontend")),
            startup_evals,
        })
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
