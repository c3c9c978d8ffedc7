// Route exports
pub mod admin;
pub mod users;

use actix_web::{error, http::StatusCode, web, HttpRequest, HttpResponse};
use std::sync::Arc;

use crate::core::{LifecycleError, LifecycleService, Scheduler, TransitionOutcome};
use crate::models::{ErrorResponse, TransitionResponse, UserId};
use crate::services::StateStore;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub lifecycle: LifecycleService,
    pub scheduler: Arc<Scheduler>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(admin::configure)
            .configure(users::configure),
    );
}

/// JSON body for extractor failures
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle malformed path segments such as a non-numeric user id
pub fn handle_path_error(err: error::PathError, req: &HttpRequest) -> actix_web::Error {
    tracing::info!("Path error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_path".to_string(),
        message: format!("Invalid path parameter: {}", err),
        status_code: 400,
    }
    .into()
}

/// Extractor configuration shared by the server and the API tests
pub fn configure_extractors(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
        .app_data(web::PathConfig::default().error_handler(handle_path_error));
}

pub(crate) fn error_response(status: StatusCode, error: &str, message: String) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message,
        status_code: status.as_u16(),
    })
}

pub(crate) fn internal_error(context: &str, err: LifecycleError) -> HttpResponse {
    tracing::error!("{}: {}", context, err);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, context, err.to_string())
}

/// Map a lifecycle outcome onto a status code
pub(crate) fn transition_response(user_id: UserId, outcome: TransitionOutcome) -> HttpResponse {
    let status = match outcome {
        TransitionOutcome::Applied(_) => StatusCode::OK,
        TransitionOutcome::NoOp(_) | TransitionOutcome::NotInChat => StatusCode::CONFLICT,
        TransitionOutcome::NotFound => {
            return error_response(StatusCode::NOT_FOUND, "User not found", format!("No user with id {}", user_id));
        }
        TransitionOutcome::PremiumRequired => StatusCode::PAYMENT_REQUIRED,
    };

    HttpResponse::build(status).json(TransitionResponse {
        user_id,
        outcome: outcome.as_str().to_string(),
        state: outcome.state(),
    })
}
