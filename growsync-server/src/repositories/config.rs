use std::sync::Arc;

use async_trait::async_trait;
use growsync_api::models::{AutomationConfig, VpdConfig};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::types::Json;
use time::OffsetDateTime;

use crate::configs::Storage;
use crate::errors::StoreError;
use crate::models::EngineConfig;
use crate::services::ConfigStore;

const VPD_CONFIG_KEY: &str = "vpd";
const AUTOMATION_CONFIG_KEY: &str = "automation";

pub struct ConfigRepository {
    storage: Arc<Storage>,
}

impl ConfigRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl ConfigRepository {
    pub async fn find_by_key(&self, key: &str) -> Result<Option<EngineConfig>, StoreError> {
        let config: Option<EngineConfig> = sqlx::query_as("SELECT * FROM engine_configs WHERE key = $1")
            .bind(key)
            .fetch_optional(self.storage.get_pool())
            .await?;

        Ok(config)
    }

    pub async fn upsert(&self, key: &str, value: serde_json::Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO engine_configs (key, value, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(Json(value))
        .bind(OffsetDateTime::now_utc())
        .execute(self.storage.get_pool())
        .await?;

        Ok(())
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.find_by_key(key).await? {
            Some(config) => Ok(Some(serde_json::from_value(config.value.0)?)),
            None => Ok(None),
        }
    }

    async fn save<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.upsert(key, serde_json::to_value(value)?).await
    }
}

#[async_trait]
impl ConfigStore for ConfigRepository {
    async fn load_vpd_config(&self) -> Result<Option<VpdConfig>, StoreError> {
        self.load(VPD_CONFIG_KEY).await
    }

    async fn save_vpd_config(&self, config: &VpdConfig) -> Result<(), StoreError> {
        self.save(VPD_CONFIG_KEY, config).await
    }

    async fn load_automation_config(&self) -> Result<Option<AutomationConfig>, StoreError> {
        self.load(AUTOMATION_CONFIG_KEY).await
    }

    async fn save_automation_config(&self, config: &AutomationConfig) -> Result<(), StoreError> {
        self.save(AUTOMATION_CONFIG_KEY, config).await
    }
}

#[cfg(test)]
mod tests {
    use growsync_api::models::GrowthStage;

    use crate::configs::{Database, SchemaManager};

    use super::*;

    async fn setup_test_db() -> Arc<Storage> {
        Arc::new(
            Storage::new(
                Database {
                    clean_start: true,
                    url: String::from("sqlite::memory:"),
                },
                SchemaManager::default(),
            )
            .await
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_missing_config_is_none() {
        let repo = ConfigRepository::new(setup_test_db().await);
        assert!(repo.load_vpd_config().await.unwrap().is_none());
        assert!(repo.load_automation_config().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_document() {
        let repo = ConfigRepository::new(setup_test_db().await);

        let mut config = VpdConfig::default();
        repo.save_vpd_config(&config).await.unwrap();

        config.growth_stage = GrowthStage::Flowering;
        config.current_fan_speed = 72;
        config.last_vpd = Some(1.31);
        repo.save_vpd_config(&config).await.unwrap();

        let loaded = repo.load_vpd_config().await.unwrap().unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_malformed_document_is_reported() {
        let repo = ConfigRepository::new(setup_test_db().await);
        repo.upsert(AUTOMATION_CONFIG_KEY, serde_json::json!({ "safety": "hot" }))
            .await
            .unwrap();

        assert!(matches!(
            repo.load_automation_config().await,
            Err(StoreError::Malformed(_))
        ));
    }
}
