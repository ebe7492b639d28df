use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use trailstop_bot_orchestrator::{ReconcileOutcome, StatusSnapshot};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Deserialize)]
pub struct SessionRequest {
    pub token: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Latest published position snapshot.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.bot.latest_status())
}

/// Runs a reconciliation pass through the actor.
///
/// # Errors
/// Returns `StatusCode::BAD_GATEWAY` if the broker query failed or the bot
/// has stopped.
pub async fn reconcile(
    State(state): State<AppState>,
) -> Result<Json<ReconcileOutcome>, StatusCode> {
    state.bot.reconcile().await.map(Json).map_err(|e| {
        tracing::warn!(error = %e, "manual reconciliation failed");
        StatusCode::BAD_GATEWAY
    })
}

/// Replaces the broker session token.
///
/// # Errors
/// Returns `StatusCode::UNPROCESSABLE_ENTITY` for a blank token.
pub async fn put_session(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<StatusCode, StatusCode> {
    if req.token.trim().is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    state.session.replace(req.token);
    Ok(StatusCode::NO_CONTENT)
}
