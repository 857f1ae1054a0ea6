use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use nl2sql::config::Config;
use nl2sql::eval::{default_cases, load_cases, log_results};
use nl2sql::execution::QueryResult;
use nl2sql::pipeline::{NlSqlService, Translation};
use serde_json::Value;
use std::io;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "nl2sql")]
#[command(about = "Translate questions into grammar-constrained SQL and verify the translations")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question against the live schema
    Query {
        /// The question in natural language
        question: String,

        /// Instant used as "now" (RFC 3339 or "YYYY-MM-DD HH:MM:SS", UTC). Defaults to the current time.
        #[arg(long)]
        reference_time: Option<String>,

        /// Output format for the result rows
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
    /// Run the eval battery; exits non-zero if any case fails
    Eval {
        /// JSON file of eval cases to use instead of the built-in battery
        #[arg(long)]
        cases: Option<PathBuf>,

        /// Print the full run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the grammar compiled from the live schema
    Grammar {
        /// Print the capability description instead of the grammar
        #[arg(long)]
        description: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

fn parse_reference_time(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| anyhow!("invalid reference time '{}': {}", raw, e))
}

fn scalar_to_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn write_csv(result: &QueryResult) -> Result<()> {
    let columns = result.column_names();
    let mut writer = csv::Writer::from_writer(io::stdout());
    writer.write_record(&columns)?;
    for row in &result.rows {
        writer.write_record(
            columns
                .iter()
                .map(|c| row.get(c).map(scalar_to_field).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    nl2sql::logging::init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let service = NlSqlService::from_config(&config)?;

    match args.command {
        Commands::Query {
            question,
            reference_time,
            format,
        } => {
            let reference_time = match reference_time {
                Some(raw) => parse_reference_time(&raw)?,
                None => Utc::now(),
            };

            let sql = match service.translate(&question, reference_time).await? {
                Translation::Sql(sql) => sql,
                Translation::Unsupported { reason, hint } => {
                    bail!("cannot answer: {}\n{}", reason, hint);
                }
            };
            info!("Generated SQL: {}", sql);

            let result = service.execute(&sql).await?;
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "sql": sql,
                        "data": result.rows,
                        "rows": result.row_count,
                    }))?
                ),
                OutputFormat::Csv => write_csv(&result)?,
            }
        }
        Commands::Eval { cases, json } => {
            let cases = match cases {
                Some(path) => load_cases(&path)?,
                None => default_cases(),
            };

            let run = service.run_evals(cases).await?;
            log_results(&run.results);
            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            }

            if let Some(error) = run.error {
                bail!("evals did not pass: {}", error);
            }
            info!("All evals passed");
        }
        Commands::Grammar { description } => {
            let (_, grammar) = service.load_grammar().await?;
            if description {
                println!("{}", grammar.description);
            } else {
                println!("{}", grammar.definition);
            }
        }
    }

    Ok(())
}
