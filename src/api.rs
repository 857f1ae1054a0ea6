//! REST API
//!
//! `POST /api/query` answers one question, `GET|POST /api/eval` runs the eval
//! battery. Every other path is served from the static directory.

use crate::eval::{log_results, EvalCase, EvalResult, EvalSummary};
use crate::execution::Row;
use crate::pipeline::{NlSqlService, Translation};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

/// API State - Shared between handlers
#[derive(Clone)]
pub struct ApiState {
    pub service: NlSqlService,
    pub eval_cases: Arc<Vec<EvalCase>>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl QueryResponse {
    fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvalResponse {
    pub results: Vec<EvalResult>,
    pub summary: EvalSummary,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn handle_query(
    State(state): State<ApiState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> (StatusCode, Json<QueryResponse>) {
    let started = Instant::now();

    let request = match payload {
        Ok(Json(request)) => request,
        Err(e) => {
            warn!("Invalid request body: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(QueryResponse::error("invalid request body")),
            );
        }
    };

    let question = request.query.trim();
    if question.is_empty() {
        warn!("Empty query received");
        return (
            StatusCode::BAD_REQUEST,
            Json(QueryResponse::error("query is required")),
        );
    }

    let sql = match state.service.translate(question, Utc::now()).await {
        Ok(Translation::Sql(sql)) => sql,
        Ok(Translation::Unsupported { reason, hint }) => {
            info!("Unsupported query: {}", reason);
            return (
                StatusCode::BAD_REQUEST,
                Json(QueryResponse {
                    error: Some(reason),
                    hint: Some(hint),
                    ..Default::default()
                }),
            );
        }
        Err(e) => {
            error!("Failed to translate query: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(QueryResponse::error(e.to_string())),
            );
        }
    };

    match state.service.execute(&sql).await {
        Ok(result) => {
            info!(
                "Query answered: {} rows in {:?}",
                result.row_count,
                started.elapsed()
            );
            (
                StatusCode::OK,
                Json(QueryResponse {
                    sql: Some(sql),
                    data: Some(result.rows),
                    rows: Some(result.row_count),
                    ..Default::default()
                }),
            )
        }
        Err(e) => {
            error!("Query execution failed: {} (sql: {})", e, sql);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(QueryResponse {
                    sql: Some(sql),
                    error: Some(e.to_string()),
                    ..Default::default()
                }),
            )
        }
    }
}

async fn handle_eval(State(state): State<ApiState>) -> Response {
    info!("Running evals on demand");

    let run = match state.service.run_evals(state.eval_cases.as_ref().clone()).await {
        Ok(run) => run,
        Err(e) => {
            error!("Eval run aborted: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response();
        }
    };
    log_results(&run.results);

    let response = EvalResponse {
        summary: run.summary(),
        passed: run.passed(),
        error: run.error,
        results: run.results,
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Create the API router. `static_dir` is served for every non-API path.
pub fn create_router(state: ApiState, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/api/query", post(handle_query))
        .route("/api/eval", get(handle_eval).post(handle_eval));

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(cors).with_state(state)
}

/// Start the API server
pub async fn start_server(
    host: &str,
    port: u16,
    state: ApiState,
    static_dir: Option<&Path>,
) -> std::io::Result<()> {
    let app = create_router(state, static_dir);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await
}
