use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};

use crate::core::TickOutcome;
use crate::models::{HealthResponse, UserId};
use crate::routes::{error_response, internal_error, transition_response, AppState};

/// Configure health and operator routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/admin/users/{id}/block", web::post().to(block_user))
        .route("/admin/users/{id}/unblock", web::post().to(unblock_user))
        .route("/admin/tick", web::post().to(run_tick))
        .route("/admin/scheduler", web::get().to(scheduler_status));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let store_healthy = state.store.health_check().await.unwrap_or(false);

    let status = if store_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// POST /api/v1/admin/users/{id}/block
async fn block_user(state: web::Data<AppState>, path: web::Path<UserId>) -> impl Responder {
    let user_id = path.into_inner();

    match state.lifecycle.block_user(user_id).await {
        Ok(outcome) => transition_response(user_id, outcome),
        Err(e) => internal_error("Failed to block user", e),
    }
}

/// POST /api/v1/admin/users/{id}/unblock
async fn unblock_user(state: web::Data<AppState>, path: web::Path<UserId>) -> impl Responder {
    let user_id = path.into_inner();

    match state.lifecycle.unblock_user(user_id).await {
        Ok(outcome) => transition_response(user_id, outcome),
        Err(e) => internal_error("Failed to unblock user", e),
    }
}

/// POST /api/v1/admin/tick
///
/// Runs one tick now; shares the single-flight guard with the periodic loop.
async fn run_tick(state: web::Data<AppState>) -> impl Responder {
    match state.scheduler.try_tick().await {
        Ok(TickOutcome::Completed(report)) => HttpResponse::Ok().json(report),
        Ok(TickOutcome::Skipped) => error_response(
            StatusCode::CONFLICT,
            "Tick in progress",
            "Another tick is running; try again shortly".to_string(),
        ),
        Err(e) => {
            tracing::error!("Manual tick failed: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Tick failed", e.to_string())
        }
    }
}

/// GET /api/v1/admin/scheduler
async fn scheduler_status(state: web::Data<AppState>) -> impl Responder {
    let settings = state.scheduler.settings();

    HttpResponse::Ok().json(serde_json::json!({
        "ticking": state.scheduler.is_ticking(),
        "intervalSecs": settings.interval.as_secs(),
        "batchThreshold": settings.batch_threshold,
        "lastReport": state.scheduler.last_report().await,
    }))
}
