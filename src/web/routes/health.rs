use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;

use crate::web::AppState;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    database: bool,
    cache: bool,
    email: bool,
}

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(health_handler))
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service and database are up", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse),
    ),
    tag = "health"
)]
pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let database = sqlx::query("SELECT 1")
        .execute(state.pool().executor())
        .await
        .inspect_err(|e| tracing::warn!("health check query failed: {}", e))
        .is_ok();

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthResponse {
            status: if database { "healthy" } else { "degraded" },
            database,
            cache: state.cache().is_enabled(),
            email: state.mailer().is_enabled(),
        }),
    )
}
