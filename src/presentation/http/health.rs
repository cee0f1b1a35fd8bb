use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use utoipa::ToSchema;

use crate::bootstrap::app_context::AppContext;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResp {
    pub status: &'static str,
    pub backend: &'static str,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, body = HealthResp))
)]
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResp> {
    let db = ctx.db();
    let status = match db.store().health().await {
        Ok(()) => "ok",
        Err(err) => {
            tracing::warn!(error = ?err, backend = db.backend(), "store_health_failed");
            "degraded"
        }
    };
    Json(HealthResp {
        status,
        backend: db.backend(),
    })
}

pub fn routes(ctx: AppContext) -> Router {
    Router::new().route("/health", get(health)).with_state(ctx)
}
