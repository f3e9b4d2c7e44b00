use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use time::OffsetDateTime;

use crate::models::Table;

/// One JSON configuration document keyed by name.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EngineConfig {
    pub key: String,
    pub value: Json<serde_json::Value>,
    pub updated_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct EngineConfigTable;

impl Table for EngineConfigTable {
    fn name(&self) -> &'static str {
        "engine_configs"
    }

    fn create(&self) -> String {
        String::from(
            r#"
            CREATE TABLE IF NOT EXISTS engine_configs (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            "#
        )
    }

    fn dispose(&self) -> String {
        String::from("DROP TABLE IF EXISTS engine_configs;")
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }
}
