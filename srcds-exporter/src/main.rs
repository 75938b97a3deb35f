use srcds_exporter::config::Config;
use srcds_exporter::poller::{LatestStatus, run_poller};
use srcds_exporter::{AppState, create_app, validation};
use srcds_metrics::{MetricLifecycle, PrometheusRegistry};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = tracing::Level::DEBUG;
    #[cfg(not(debug_assertions))]
    let log_level = tracing::Level::INFO;

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting srcds exporter...");
    // Load configuration from environment variables or use defaults
    let config = Config::from_env();
    if let Err(e) = validation::validate_server_name(&config.server_name) {
        tracing::error!("Invalid SERVER_NAME: {}", e);
        return ExitCode::FAILURE;
    }
    tracing::info!(
        "Configuration: port={}, server={}, poll={}s, sweep={}s, body_limit={}KB, timeout={}s",
        config.port,
        config.server_name,
        config.poll_interval.as_secs(),
        config.sweep_interval.as_secs(),
        config.request_body_limit / 1024,
        config.request_timeout.as_secs()
    );
    tracing::info!(
        "Rate limits: status=1/{}ms (burst {}), general=1/{}ms (burst {})",
        config.rate_limit_status_replenish_ms,
        config.rate_limit_status_burst,
        config.rate_limit_general_replenish_ms,
        config.rate_limit_general_burst
    );

    let registry = Arc::new(PrometheusRegistry::new());
    let lifecycle = Arc::new(
        MetricLifecycle::new(registry.clone(), config.server_name.clone())
            .with_sweep_interval(config.sweep_interval),
    );
    let latest = Arc::new(LatestStatus::new());

    let app = create_app(
        AppState {
            registry,
            latest: latest.clone(),
        },
        config.request_body_limit,
        config.request_timeout,
        config.rate_limit(),
    );
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Server listening on {}", addr);

    // Metrics stop being served as soon as either side fails
    tokio::select! {
        result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
            if let Err(e) = result {
                tracing::error!("Axum server error: {}", e);
            }
        }
        result = run_poller(latest, lifecycle, config.poll_interval) => {
            if let Err(e) = result {
                tracing::error!("Metric registration failed, shutting down: {}", e);
            }
        }
    }
    ExitCode::FAILURE
}
