use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use profiler::aggregator::RawActivityBundle;
use profiler::pipeline::{EvaluateError, Evaluated};
use profiler::sources::ActivityApi;
use std::sync::Arc;

use super::{evaluate_error, ApiError, AppState};

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

pub async fn missing_address() -> ApiError {
    evaluate_error(EvaluateError::MissingAddress)
}

pub async fn analyze<P: ActivityApi>(
    State(state): State<Arc<AppState<P>>>,
    Path(address): Path<String>,
) -> Result<Json<RawActivityBundle>, ApiError> {
    state
        .pipeline
        .analyze(&address, now_epoch())
        .await
        .map(Json)
        .map_err(evaluate_error)
}

pub async fn update_persona<P: ActivityApi>(
    State(state): State<Arc<AppState<P>>>,
    Path(address): Path<String>,
) -> Result<Json<Evaluated>, ApiError> {
    state
        .pipeline
        .update(&address, now_epoch())
        .await
        .map(Json)
        .map_err(evaluate_error)
}

pub async fn cached_persona<P: ActivityApi>(
    State(state): State<Arc<AppState<P>>>,
    Path(address): Path<String>,
) -> Result<(StatusCode, Json<Evaluated>), ApiError> {
    let evaluated = state
        .pipeline
        .cached_or_update(&address, now_epoch())
        .await
        .map_err(evaluate_error)?;
    Ok((StatusCode::OK, Json(evaluated)))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{send, test_app, test_app_with, StaticApi, ADDR};
    use axum::http::{Method, StatusCode};
    use std::time::Duration;

    #[tokio::test]
    async fn test_missing_address_is_bad_request() {
        let (app, _state) = test_app().await;
        let (status, json) = send(&app, Method::GET, "/api/wallet").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["message"], "wallet address is required");
    }

    #[tokio::test]
    async fn test_invalid_address_is_bad_request() {
        let (app, state) = test_app().await;
        let (status, json) = send(&app, Method::GET, "/api/wallet/0x123").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["message"]
            .as_str()
            .unwrap()
            .starts_with("invalid wallet address"));
        let (status, _) = send(&app, Method::POST, "/api/wallet/zzz/persona").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.pipeline.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_analyze_returns_bundle() {
        let (app, state) = test_app().await;
        let uri = format!("/api/wallet/{}", ADDR.to_ascii_lowercase());
        let (status, json) = send(&app, Method::GET, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["wallet"], ADDR);
        assert_eq!(json["recent_transactions_count"], 1);
        assert!(json["NFT"]["owned_nfts_count"].is_number());
        assert!(json["FT"]["error"].is_string());
        assert_eq!(state.pipeline.store().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_on_empty_population_omits_scores() {
        let (app, _state) = test_app().await;
        let uri = format!("/api/wallet/{ADDR}/persona");
        let (status, json) = send(&app, Method::POST, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["address"], ADDR);
        assert_eq!(json["persisted"], "inserted");
        assert!(json.get("position").is_none());
        assert!(json.get("scores").is_none());
    }

    #[tokio::test]
    async fn test_cached_persona_serves_stored_record() {
        let (app, state) = test_app().await;
        state
            .pipeline
            .store()
            .seed_metrics("0x0000000000000000000000000000000000000001", 0, Default::default())
            .await
            .unwrap();
        let uri = format!("/api/wallet/{ADDR}/persona");

        let (status, first) = send(&app, Method::GET, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["cached"], false);
        assert!(first["position"].is_string());

        let (status, second) = send(&app, Method::GET, &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["cached"], true);
        assert_eq!(second["position"], first["position"]);
        assert!(second["persisted"].is_null());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregation_timeout_is_server_error() {
        let api = StaticApi {
            stall: Some(Duration::from_secs(600)),
        };
        let (app, state) = test_app_with(api, Duration::from_secs(1)).await;
        let uri = format!("/api/wallet/{ADDR}/persona");
        let (status, json) = send(&app, Method::POST, &uri).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["message"].as_str().unwrap().contains("timed out"));
        assert_eq!(state.pipeline.store().count().await.unwrap(), 0);
    }
}
