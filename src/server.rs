use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::SolverDefaults;
use crate::data::{Assignment, SchedulingInput, SolveReport};
use crate::error::SolveError;
use crate::serialize;
use crate::solver;
use crate::verify::Violation;

type Defaults = Arc<SolverDefaults>;

#[derive(Debug, Deserialize)]
struct CheckRequest {
    input: SchedulingInput,
    assignments: Vec<Assignment>,
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    valid: bool,
    violations: Vec<Violation>,
}

enum ApiError {
    Solve(SolveError),
    Worker(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Solve(e) => {
                let status = match e {
                    SolveError::Validation(_) => StatusCode::BAD_REQUEST,
                    SolveError::Unsatisfiable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    SolveError::BudgetExceeded { .. } => StatusCode::REQUEST_TIMEOUT,
                };
                (status, Json(serialize::error_body(&e))).into_response()
            }
            ApiError::Worker(message) => {
                error!("Solver worker failed: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal", "message": message })),
                )
                    .into_response()
            }
        }
    }
}

/// Runs a CPU-bound job off the async executor.
async fn run_blocking<T, F>(job: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SolveError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| ApiError::Worker(e.to_string()))?
        .map_err(ApiError::Solve)
}

async fn generate_handler(
    State(defaults): State<Defaults>,
    Json(input): Json<SchedulingInput>,
) -> Result<Json<Vec<Assignment>>, ApiError> {
    run_blocking(move || solver::generate(&input, &defaults)).await.map(Json)
}

async fn solve_handler(
    State(defaults): State<Defaults>,
    Json(input): Json<SchedulingInput>,
) -> Result<Json<SolveReport>, ApiError> {
    run_blocking(move || solver::solve(&input, &defaults)).await.map(Json)
}

async fn check_handler(
    State(defaults): State<Defaults>,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResponse>, ApiError> {
    let violations =
        run_blocking(move || solver::check(&request.input, &request.assignments, &defaults)).await?;
    Ok(Json(CheckResponse {
        valid: violations.is_empty(),
        violations,
    }))
}

async fn health_handler() -> &'static str {
    "ok"
}

pub fn router(defaults: SolverDefaults) -> Router {
    Router::new()
        .route("/v1/timetable/generate", post(generate_handler))
        .route("/v1/timetable/solve", post(solve_handler))
        .route("/v1/timetable/check", post(check_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::new(defaults))
}

pub async fn run_server(bind: SocketAddr, defaults: SolverDefaults) -> std::io::Result<()> {
    let app = router(defaults);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Server running at http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}
