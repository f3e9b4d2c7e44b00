pub mod actuator;
pub mod api;
pub mod engine;
pub mod store;

pub use actuator::ActuatorError;
pub use api::ApiError;
pub use engine::EngineError;
pub use store::StoreError;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use uuid::Uuid;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, error_id) = match self {
            ApiError::EngineError(e) if e.is_internal() => {
                let error_id = Uuid::new_v4();
                tracing::error!(error_id = ?error_id, "Engine error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(error_id.to_string()),
                )
            }
            ApiError::EngineError(e) => (e.status_code(), e.to_string(), None),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            ApiError::InternalError(e) => {
                let error_id = Uuid::new_v4();
                tracing::error!(error_id = ?error_id, "Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(error_id.to_string()),
                )
            }
        };

        let mut error_obj = json!({
            "code": status.as_u16(),
            "message": error_message
        });

        if let Some(error_id) = error_id {
            error_obj["error_id"] = json!(error_id);
        }

        (status, Json(json!({ "error": error_obj }))).into_response()
    }
}
