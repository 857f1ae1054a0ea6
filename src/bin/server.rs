//! HTTP server for the natural language -> SQL service.
//!
//! Loads config, fails hard if the schema cannot be fetched or compiled, runs
//! the eval battery once (unless disabled), then serves the API.

use anyhow::{bail, Context, Result};
use clap::Parser;
use nl2sql::api::{start_server, ApiState};
use nl2sql::config::Config;
use nl2sql::eval::{default_cases, load_cases, log_results};
use nl2sql::pipeline::NlSqlService;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Natural language to SQL API server")]
struct Args {
    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Skip the eval battery at startup (overrides STARTUP_EVALS)
    #[arg(long)]
    skip_startup_evals: bool,

    /// JSON file of eval cases to use instead of the built-in battery
    #[arg(long)]
    cases: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    nl2sql::logging::init();

    let args = Args::parse();
    let config = Config::from_env()?;
    info!(
        "Config loaded: tinybird_host={}, model={}, port={}",
        config.tinybird_host,
        config.openai_model,
        args.port.unwrap_or(config.port)
    );

    let service = NlSqlService::from_config(&config)?;

    let (schema, _) = service
        .load_grammar()
        .await
        .context("failed to load schema from the catalog")?;
    info!("Schema loaded: {} tables", schema.tables.len());

    let cases = match &args.cases {
        Some(path) => load_cases(path)
            .with_context(|| format!("failed to load eval cases from {}", path.display()))?,
        None => default_cases(),
    };

    if config.startup_evals && !args.skip_startup_evals {
        info!("Running startup evals...");
        let run = service.run_evals(cases.clone()).await?;
        log_results(&run.results);
        if let Some(error) = run.error {
            bail!("startup evals failed: {}", error);
        }
        info!("Startup evals passed");
    }

    let state = ApiState {
        service,
        eval_cases: Arc::new(cases),
    };
    let static_dir = config.static_dir.exists().then_some(config.static_dir.as_path());
    start_server(&args.host, args.port.unwrap_or(config.port), state, static_dir).await?;

    Ok(())
}
