pub mod personas;
pub mod wallet;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use profiler::pipeline::{EvaluateError, Pipeline};
use profiler::sources::ActivityApi;
use serde::Serialize;
use std::sync::Arc;

/// Shared application state available to all handlers.
pub struct AppState<P> {
    pub pipeline: Pipeline<P>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

pub fn router<P: ActivityApi + 'static>(state: Arc<AppState<P>>) -> Router {
    Router::new()
        .route("/api/health", get(health::<P>))
        .route("/api/wallet", get(wallet::missing_address))
        .route("/api/wallet/{address}", get(wallet::analyze::<P>))
        .route(
            "/api/wallet/{address}/persona",
            get(wallet::cached_persona::<P>).post(wallet::update_persona::<P>),
        )
        .route(
            "/api/personas/{group}/contracts",
            get(personas::popular_contracts::<P>),
        )
        .route(
            "/api/personas/{group}/averages",
            get(personas::group_averages::<P>),
        )
        .route("/api/stats/reference", get(personas::reference_stats::<P>))
        .with_state(state)
}

#[derive(Serialize)]
pub(crate) struct MessageResponse {
    pub message: String,
}

pub(crate) type ApiError = (StatusCode, Json<MessageResponse>);

pub(crate) fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(MessageResponse {
            message: message.into(),
        }),
    )
}

pub(crate) fn internal(err: &anyhow::Error) -> ApiError {
    tracing::error!(error = %err, "request failed");
    error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

impl From<EvaluateError> for MessageResponse {
    fn from(err: EvaluateError) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

pub(crate) fn evaluate_error(err: EvaluateError) -> ApiError {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        tracing::error!(error = %err, "wallet evaluation failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(err.into()))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_secs: i64,
}

async fn health<P: ActivityApi>(State(state): State<Arc<AppState<P>>>) -> impl IntoResponse {
    let uptime = chrono::Utc::now()
        .signed_duration_since(state.started_at)
        .num_seconds();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: uptime,
    })
}
