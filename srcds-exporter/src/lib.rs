pub mod config;
mod error;
pub mod poller;
mod routes;
pub mod validation;

pub use error::ErrorResponse;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use poller::LatestStatus;
use srcds_metrics::PrometheusRegistry;
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

pub struct AppState {
    /// Registry rendered by GET /metrics
    pub registry: Arc<PrometheusRegistry>,
    /// Filled by POST /status, read by the poller
    pub latest: Arc<LatestStatus>,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Milliseconds between replenished requests for /status
    pub status_replenish_ms: u64,
    /// Burst size for /status
    pub status_burst: u32,
    /// Milliseconds between replenished requests for /metrics
    pub general_replenish_ms: u64,
    /// Burst size for /metrics
    pub general_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            status_replenish_ms: 500,
            status_burst: 5,
            general_replenish_ms: 100,
            general_burst: 20,
        }
    }
}

/// Create the application router with the given state and configuration
pub fn create_app(
    state: AppState,
    request_body_limit: usize,
    request_timeout: Duration,
    rate_limit: RateLimitConfig,
) -> Router {
    let state = Arc::new(state);

    // The game server side pushes a few times per poll interval at most
    let status_governor = GovernorConfigBuilder::default()
        .per_millisecond(rate_limit.status_replenish_ms.max(1))
        .burst_size(rate_limit.status_burst.max(1))
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("status rate limit is non-zero");

    // Scrapers, dashboards and the occasional curl
    let general_governor = GovernorConfigBuilder::default()
        .per_millisecond(rate_limit.general_replenish_ms.max(1))
        .burst_size(rate_limit.general_burst.max(1))
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("general rate limit is non-zero");

    let status_routes = Router::new()
        .route("/status", post(routes::push_status))
        .layer(GovernorLayer::new(status_governor));

    let general_routes = Router::new()
        .route("/metrics", get(routes::metrics))
        .layer(GovernorLayer::new(general_governor));

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .merge(status_routes)
        .merge(general_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(RequestBodyLimitLayer::new(request_body_limit))
        .with_state(state)
}
