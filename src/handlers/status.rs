use axum::{extract::State, http::StatusCode, Json};

use crate::models::status::{ErrorResponse, HealthResponse, SupervisorsResponse};
use crate::AppState;

pub async fn health(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<ErrorResponse>)> {
    state.db.ping().await.map_err(|e| {
        tracing::warn!("Health check failed: {}", e);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: format!("Database error: {}", e),
            }),
        )
    })?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        database: true,
    }))
}

pub async fn list_supervisors(State(state): State<AppState>) -> Json<SupervisorsResponse> {
    let supervisors = state.supervisors.snapshot();
    tracing::debug!("Reporting {} supervisors", supervisors.len());
    Json(SupervisorsResponse { supervisors })
}
