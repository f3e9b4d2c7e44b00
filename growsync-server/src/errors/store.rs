use growsync_api::models::Id;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Rule {0} not found")]
    RuleNotFound(Id),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
