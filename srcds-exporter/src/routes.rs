use crate::AppState;
use crate::error::AppError;
use crate::validation;

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use axum_macros::debug_handler;
use srcds_metrics::Status;
use std::sync::Arc;

#[debug_handler]
pub(crate) async fn push_status(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Status>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_status(&payload)?;

    tracing::debug!(
        map = %payload.map,
        players = payload.players.len(),
        current = payload.player_count.current,
        max = payload.player_count.max,
        "status received"
    );
    state.latest.store(payload).await;

    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler]
pub(crate) async fn metrics(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let body = state.registry.render()?;
    Ok((
        [(header::CONTENT_TYPE, state.registry.content_type())],
        body,
    ))
}
