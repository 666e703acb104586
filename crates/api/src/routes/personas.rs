use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use common::types::Position;
use profiler::persona_contracts::{GroupAverages, PopularContract};
use profiler::reference_stats::{ReferenceStats, StatsError};
use profiler::sources::ActivityApi;
use serde::Deserialize;
use std::sync::Arc;

use super::{error, internal, ApiError, AppState};

#[derive(Deserialize)]
pub struct ContractsQuery {
    pub limit: Option<u32>,
}

fn parse_group(label: &str) -> Result<Position, ApiError> {
    label
        .parse()
        .map_err(|e: String| error(StatusCode::BAD_REQUEST, e))
}

pub async fn popular_contracts<P: ActivityApi>(
    State(state): State<Arc<AppState<P>>>,
    Path(group): Path<String>,
    Query(query): Query<ContractsQuery>,
) -> Result<Json<Vec<PopularContract>>, ApiError> {
    let group = parse_group(&group)?;
    let limit = query.limit.unwrap_or(1);
    state
        .pipeline
        .store()
        .popular_contracts(group, limit)
        .await
        .map(Json)
        .map_err(|e| internal(&e))
}

pub async fn group_averages<P: ActivityApi>(
    State(state): State<Arc<AppState<P>>>,
    Path(group): Path<String>,
) -> Result<Json<GroupAverages>, ApiError> {
    let group = parse_group(&group)?;
    state
        .pipeline
        .store()
        .group_averages(group)
        .await
        .map(Json)
        .map_err(|e| internal(&e))
}

pub async fn reference_stats<P: ActivityApi>(
    State(state): State<Arc<AppState<P>>>,
) -> Result<Json<ReferenceStats>, ApiError> {
    match state.pipeline.reference_stats().await {
        Ok(stats) => Ok(Json(stats)),
        Err(e @ StatsError::EmptyPopulation) => Err(error(StatusCode::CONFLICT, e.to_string())),
        Err(StatsError::Storage(e)) => Err(internal(&e)),
    }
}
