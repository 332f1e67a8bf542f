use axum::{extract::State, http::StatusCode, response::Json};
use diesel::{sql_query, RunQueryDsl};
use serde_json::json;

use crate::state::AppState;

/// Reports `degraded` with 503 when the database cannot be reached, since
/// service generation is impossible without it.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let pool = state.pool.clone();
    let reachable = tokio::task::spawn_blocking(move || {
        pool.get()
            .ok()
            .map(|mut conn| sql_query("SELECT 1").execute(&mut conn).is_ok())
            .unwrap_or(false)
    })
    .await
    .unwrap_or(false);

    if reachable {
        (StatusCode::OK, Json(json!({ "status": "ok", "database": "up" })))
    } else {
        tracing::warn!("health check could not reach the database");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "database": "down" })),
        )
    }
}
