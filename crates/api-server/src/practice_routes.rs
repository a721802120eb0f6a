//! Practice API Routes
//!
//! Chart data for the drawing surface and scoring of learner annotations.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chart_core::{AssetType, Candle, ChartRequest, Timeframe, TrainerError, ValidationOutcome, ValidationRequest};
use serde::{Deserialize, Serialize};

use crate::{ApiResponse, AppError, AppState, RequestId};

#[cfg(test)]
#[path = "practice_routes_tests.rs"]
mod practice_routes_tests;

/// Query for `GET /api/practice/fetch`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchQuery {
    pub asset: String,
    pub asset_type: Option<AssetType>,
    pub timeframe: Option<Timeframe>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChartResponse {
    pub candles: Vec<Candle>,
}

pub fn practice_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/practice/validate", post(validate))
        .route("/api/practice/fetch", get(fetch_chart))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Score a submission. Rejections come back as a successful response carrying `status: "rejected"`.
async fn validate(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    Json(request): Json<ValidationRequest>,
) -> Result<Json<ApiResponse<ValidationOutcome>>, AppError> {
    let request_id = request_id.map(|Extension(RequestId(id))| id).unwrap_or_default();
    tracing::debug!(
        request_id = %request_id,
        tool = %request.tool,
        drawings = request.drawings.len(),
        candles = request.series.len(),
        "Validate request"
    );

    let engine = state.engine.clone();
    let outcome = tokio::task::spawn_blocking(move || engine.validate(&request)).await?;

    Ok(Json(ApiResponse::success(outcome)))
}

async fn fetch_chart(
    State(state): State<AppState>,
    Query(query): Query<FetchQuery>,
) -> Result<Json<ApiResponse<ChartResponse>>, AppError> {
    let asset = query.asset.trim();
    if asset.is_empty() {
        return Err(AppError::bad_request("asset is required"));
    }

    let provider = state
        .provider
        .as_ref()
        .ok_or_else(|| TrainerError::Config("Market data provider not configured".to_string()))?;

    let request = ChartRequest {
        asset: asset.to_string(),
        asset_type: query.asset_type.unwrap_or(AssetType::Stock),
        timeframe: query.timeframe.unwrap_or_default(),
    };
    let candles = provider.fetch_chart(&request).await?;

    Ok(Json(ApiResponse::success(ChartResponse { candles })))
}
