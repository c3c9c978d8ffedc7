use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder};
use validator::Validate;

use crate::core::UserStatus;
use crate::models::{
    CompleteProfileRequest, GrantPremiumRequest, ProfileUpdate, RegisterUserRequest, ReportPartnerRequest,
    UserId, UserResponse,
};
use crate::routes::{error_response, internal_error, transition_response, AppState};

/// Configure user command routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/users", web::post().to(register_user))
        .route("/users/{id}", web::get().to(get_user))
        .route("/users/{id}/onboarding", web::post().to(restart_onboarding))
        .route("/users/{id}/profile", web::post().to(complete_profile))
        .route("/users/{id}/search/cancel", web::post().to(cancel_search))
        .route("/users/{id}/chat/end", web::post().to(end_chat))
        .route("/users/{id}/chat/report", web::post().to(report_partner))
        .route("/users/{id}/premium", web::post().to(grant_premium));
}

fn validation_failed(errors: validator::ValidationErrors) -> HttpResponse {
    tracing::info!("Validation failed: {:?}", errors);
    error_response(StatusCode::BAD_REQUEST, "Validation failed", errors.to_string())
}

fn status_response(status: &UserStatus) -> UserResponse {
    UserResponse::from_user(&status.user, status.premium_active, status.free_matches_remaining)
}

/// POST /api/v1/users
///
/// ```json
/// { "userId": 42, "username": "anon" }
/// ```
async fn register_user(state: web::Data<AppState>, req: web::Json<RegisterUserRequest>) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    let req = req.into_inner();
    if let Err(e) = state.lifecycle.register(req.user_id, req.username.as_deref()).await {
        return internal_error("Failed to register user", e);
    }

    match state.lifecycle.status(req.user_id).await {
        Ok(Some(status)) => HttpResponse::Created().json(status_response(&status)),
        Ok(None) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to register user",
            format!("User {} missing after insert", req.user_id),
        ),
        Err(e) => internal_error("Failed to register user", e),
    }
}

/// GET /api/v1/users/{id}
async fn get_user(state: web::Data<AppState>, path: web::Path<UserId>) -> impl Responder {
    let user_id = path.into_inner();

    match state.lifecycle.status(user_id).await {
        Ok(Some(status)) => HttpResponse::Ok().json(status_response(&status)),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "User not found", format!("No user with id {}", user_id)),
        Err(e) => internal_error("Failed to fetch user", e),
    }
}

/// POST /api/v1/users/{id}/onboarding
async fn restart_onboarding(state: web::Data<AppState>, path: web::Path<UserId>) -> impl Responder {
    let user_id = path.into_inner();

    match state.lifecycle.restart_onboarding(user_id).await {
        Ok(outcome) => transition_response(user_id, outcome),
        Err(e) => internal_error("Failed to restart onboarding", e),
    }
}

/// POST /api/v1/users/{id}/profile
///
/// ```json
/// { "age": 25, "gender": "Female", "preference": "Male",
///   "city": "Mumbai", "latitude": 19.076, "longitude": 72.8777 }
/// ```
async fn complete_profile(
    state: web::Data<AppState>,
    path: web::Path<UserId>,
    req: web::Json<CompleteProfileRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    let user_id = path.into_inner();
    let profile = ProfileUpdate::from(req.into_inner());

    match state.lifecycle.complete_profile(user_id, &profile).await {
        Ok(outcome) => transition_response(user_id, outcome),
        Err(e) => internal_error("Failed to complete profile", e),
    }
}

/// POST /api/v1/users/{id}/search/cancel
async fn cancel_search(state: web::Data<AppState>, path: web::Path<UserId>) -> impl Responder {
    let user_id = path.into_inner();

    match state.lifecycle.cancel_search(user_id).await {
        Ok(outcome) => transition_response(user_id, outcome),
        Err(e) => internal_error("Failed to cancel search", e),
    }
}

/// POST /api/v1/users/{id}/chat/end
async fn end_chat(state: web::Data<AppState>, path: web::Path<UserId>) -> impl Responder {
    let user_id = path.into_inner();

    match state.lifecycle.end_chat(user_id).await {
        Ok(outcome) => transition_response(user_id, outcome),
        Err(e) => internal_error("Failed to end chat", e),
    }
}

/// POST /api/v1/users/{id}/chat/report
async fn report_partner(
    state: web::Data<AppState>,
    path: web::Path<UserId>,
    req: web::Json<ReportPartnerRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    let user_id = path.into_inner();
    match state.lifecycle.report_partner(user_id, &req.reason).await {
        Ok(outcome) => transition_response(user_id, outcome),
        Err(e) => internal_error("Failed to report partner", e),
    }
}

/// POST /api/v1/users/{id}/premium
///
/// Called by billing once a payment settles.
async fn grant_premium(
    state: web::Data<AppState>,
    path: web::Path<UserId>,
    req: web::Json<GrantPremiumRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors);
    }

    let user_id = path.into_inner();
    match state
        .lifecycle
        .grant_premium(user_id, &req.plan, req.duration_days)
        .await
    {
        Ok(Some(status)) => HttpResponse::Ok().json(status_response(&status)),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "User not found", format!("No user with id {}", user_id)),
        Err(e) => internal_error("Failed to grant premium", e),
    }
}
