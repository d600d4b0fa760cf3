//! Liveness endpoint.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::models::HealthResponse;

/// `GET /api/healthy`: reports version and, with a database, its reachability.
pub async fn healthy(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_connected = match &state.pool {
        Some(pool) => Some(sqlx::query("SELECT 1").execute(pool).await.is_ok()),
        None => None,
    };
    Json(HealthResponse {
        status: "ok".into(),
        version: orgo_core::version().to_string(),
        db_connected,
    })
}
