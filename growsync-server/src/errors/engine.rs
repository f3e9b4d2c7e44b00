use std::time::Duration;

use axum::http::StatusCode;
use growsync_api::ValidationError;
use growsync_api::models::Id;

use super::{ActuatorError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Actuator dispatch failed: {0}")]
    ActuatorDispatch(#[from] ActuatorError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("{operation} timed out after {limit:?}")]
    Timeout { operation: &'static str, limit: Duration },

    #[error("Rule {0} not found")]
    RuleNotFound(Id),

    #[error("Engine is shutting down")]
    Stopped,
}

impl EngineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::RuleNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Persistence(StoreError::RuleNotFound(_)) => StatusCode::NOT_FOUND,
            EngineError::ActuatorDispatch(_) => StatusCode::BAD_GATEWAY,
            EngineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Errors whose details stay in the logs rather than the response body.
    pub fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}
