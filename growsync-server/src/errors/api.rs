use super::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Engine error: {0}")]
    EngineError(#[from] EngineError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}
