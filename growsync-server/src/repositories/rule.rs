use std::sync::Arc;

use async_trait::async_trait;
use growsync_api::models::{Id, MAX_RULE_HISTORY, Rule, RuleHistoryEntry, RuleStats};
use sqlx::types::Json;

use crate::configs::Storage;
use crate::errors::StoreError;
use crate::models::RuleRecord;
use crate::services::RuleStore;

pub struct RuleRepository {
    storage: Arc<Storage>,
}

impl RuleRepository {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }
}

impl RuleRepository {
    // Create new rule, statistics and history start empty
    pub async fn create(&self, item: &Rule) -> Result<Id, StoreError> {
        let id = sqlx::query(
            r#"
            INSERT INTO rules (
                name, description, conditions, actions, else_actions, enabled, priority,
                cooldown, max_executions, depends_on, conflicts_with, test_mode, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&item.name)
        .bind(&item.description)
        .bind(Json(&item.conditions))
        .bind(Json(&item.actions))
        .bind(item.else_actions.as_ref().map(Json))
        .bind(item.enabled)
        .bind(i64::from(item.priority))
        .bind(i64::try_from(item.cooldown).unwrap_or(i64::MAX))
        .bind(i64::try_from(item.max_executions).unwrap_or(i64::MAX))
        .bind(Json(&item.depends_on))
        .bind(Json(&item.conflicts_with))
        .bind(item.test_mode)
        .bind(item.created_at)
        .execute(self.storage.get_pool())
        .await?
        .last_insert_rowid();

        Ok(id as Id)
    }

    // Find rule by ID
    pub async fn find_by_id(&self, id: Id) -> Result<Option<Rule>, StoreError> {
        let record: Option<RuleRecord> = sqlx::query_as("SELECT * FROM rules WHERE id = $1")
            .bind(id)
            .fetch_optional(self.storage.get_pool())
            .await?;

        Ok(record.map(Rule::try_from).transpose()?)
    }
}

#[async_trait]
impl RuleStore for RuleRepository {
    async fn load_enabled_rules(&self) -> Result<Vec<Rule>, StoreError> {
        let records: Vec<RuleRecord> = sqlx::query_as(
            r#"
            SELECT * FROM rules
            WHERE enabled = TRUE
            ORDER BY priority DESC, created_at DESC, id DESC
            "#,
        )
        .fetch_all(self.storage.get_pool())
        .await?;

        let rules = records
            .into_iter()
            .filter_map(|record| {
                let id = record.id;
                match Rule::try_from(record) {
                    Ok(rule) => Some(rule),
                    Err(e) => {
                        tracing::warn!("Skipping malformed rule {}: {}", id, e);
                        None
                    }
                }
            })
            .collect();

        Ok(rules)
    }

    async fn find_rule(&self, id: Id) -> Result<Option<Rule>, StoreError> {
        self.find_by_id(id).await
    }

    async fn save_rule_stats(&self, id: Id, stats: &RuleStats) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE rules
            SET execution_count = $1, last_executed = $2, last_result = $3
            WHERE id = $4
            "#,
        )
        .bind(i64::try_from(stats.execution_count).unwrap_or(i64::MAX))
        .bind(stats.last_executed)
        .bind(stats.last_result.map(|result| result.as_str()))
        .bind(id)
        .execute(self.storage.get_pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RuleNotFound(id));
        }
        Ok(())
    }

    async fn set_rule_enabled(&self, id: Id, enabled: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE rules SET enabled = $1 WHERE id = $2")
            .bind(enabled)
            .bind(id)
            .execute(self.storage.get_pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RuleNotFound(id));
        }
        Ok(())
    }

    async fn append_rule_history(&self, id: Id, entry: &RuleHistoryEntry) -> Result<(), StoreError> {
        let mut tx = self.storage.get_pool().begin().await?;

        let history: Option<Json<Vec<RuleHistoryEntry>>> =
            sqlx::query_scalar("SELECT history FROM rules WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(Json(mut history)) = history else {
            return Err(StoreError::RuleNotFound(id));
        };

        history.push(entry.clone());
        if history.len() > MAX_RULE_HISTORY {
            let overflow = history.len() - MAX_RULE_HISTORY;
            history.drain(..overflow);
        }

        sqlx::query("UPDATE rules SET history = $1 WHERE id = $2")
            .bind(Json(&history))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}
