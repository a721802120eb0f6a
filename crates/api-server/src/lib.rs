//! HTTP transport for the chart annotation trainer.

use std::sync::Arc;
use std::time::Duration;

use annotation_validator::ValidationEngine;
use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    BoxError, Json, Router,
};
use chart_core::{MarketDataProvider, TrainerError, ValidationConfig};
use market_data::PolygonClient;
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod practice_routes;
mod request_id;

pub use practice_routes::practice_routes;
pub use request_id::{request_id_middleware, RequestId};

/// Envelope for every JSON response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Handler error. Anything convertible to `anyhow::Error` can be returned with `?`.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: anyhow::anyhow!(message.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn status_for(error: &anyhow::Error) -> StatusCode {
    match error.downcast_ref::<TrainerError>() {
        Some(TrainerError::DataUnavailable(_)) | Some(TrainerError::Api(_)) => StatusCode::BAD_GATEWAY,
        Some(TrainerError::RequestTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        Some(TrainerError::EmptySubmission(_))
        | Some(TrainerError::InvalidToolState(_))
        | Some(TrainerError::InvalidSeries(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(TrainerError::Config(_)) => StatusCode::SERVICE_UNAVAILABLE,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.error, "Request failed");
        } else {
            tracing::warn!(status = %self.status, error = %self.error, "Request rejected");
        }
        (self.status, Json(ApiResponse::<()>::error(self.error.to_string()))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let error = err.into();
        Self {
            status: status_for(&error),
            error,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ValidationEngine>,
    /// `None` when no market-data credentials are configured
    pub provider: Option<Arc<dyn MarketDataProvider>>,
}

impl AppState {
    pub fn new(engine: ValidationEngine, provider: Option<Arc<dyn MarketDataProvider>>) -> Self {
        Self {
            engine: Arc::new(engine),
            provider,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub polygon_api_key: Option<String>,
    pub request_timeout: Duration,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("PORT must be a valid port number: {}", e))?;
        let timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("REQUEST_TIMEOUT_SECS must be a number: {}", e))?;
        if timeout_secs == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            polygon_api_key: std::env::var("POLYGON_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

async fn handle_middleware_error(err: BoxError) -> (StatusCode, Json<ApiResponse<()>>) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, Json(ApiResponse::error("Request timed out")))
    } else {
        tracing::error!("Unhandled middleware error: {}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("Internal server error")),
        )
    }
}

/// Router with every route and the standard middleware stack
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .merge(practice_routes())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(request_timeout),
        )
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Starting chart trainer API server");

    let config = ServerConfig::from_env()?;
    let validation = ValidationConfig::from_env()?;
    tracing::info!(
        "  Swing radius: {}, tolerances: swing {} / fib {} / fvg {:.2}",
        validation.swing_radius,
        validation.swing_index_tolerance,
        validation.fib_endpoint_tolerance,
        validation.fvg_min_overlap
    );

    let provider: Option<Arc<dyn MarketDataProvider>> = match &config.polygon_api_key {
        Some(key) => Some(Arc::new(PolygonClient::new(key.clone()))),
        None => {
            tracing::warn!("POLYGON_API_KEY not set; /api/practice/fetch will be unavailable");
            None
        }
    };

    let state = AppState::new(ValidationEngine::new(validation), provider);
    let app = build_router(state, config.request_timeout);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
