use growsync_api::models::{Action, Condition, Id, Rule, RuleHistoryEntry, RuleResult, RuleStats};
use serde_json::Value;
use sqlx::types::Json;
use time::OffsetDateTime;

use crate::models::Table;

/// Row shape of the `rules` table. Lists are stored as JSON documents and
/// decoded per row, so one malformed rule cannot hide the others.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RuleRecord {
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
    pub conditions: Json<Value>,
    pub actions: Json<Value>,
    pub else_actions: Option<Json<Value>>,
    pub enabled: bool,
    pub priority: i64,
    pub cooldown: i64,
    pub max_executions: i64,
    pub execution_count: i64,
    pub last_executed: Option<OffsetDateTime>,
    pub last_result: Option<String>,
    pub depends_on: Json<Value>,
    pub conflicts_with: Json<Value>,
    pub test_mode: bool,
    pub history: Json<Value>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<RuleRecord> for Rule {
    type Error = serde_json::Error;

    fn try_from(record: RuleRecord) -> Result<Self, Self::Error> {
        let else_actions: Option<Vec<Action>> = match record.else_actions {
            Some(Json(actions)) => serde_json::from_value(actions)?,
            None => None,
        };

        Ok(Rule {
            id: record.id,
            name: record.name,
            description: record.description,
            conditions: serde_json::from_value::<Vec<Condition>>(record.conditions.0)?,
            actions: serde_json::from_value::<Vec<Action>>(record.actions.0)?,
            else_actions,
            enabled: record.enabled,
            priority: record.priority.clamp(0, 100) as u8,
            cooldown: record.cooldown.max(0) as u64,
            max_executions: record.max_executions.max(0) as u64,
            stats: RuleStats {
                execution_count: record.execution_count.max(0) as u64,
                last_executed: record.last_executed,
                last_result: record.last_result.as_deref().and_then(RuleResult::parse),
            },
            depends_on: serde_json::from_value::<Vec<Id>>(record.depends_on.0)?,
            conflicts_with: serde_json::from_value::<Vec<Id>>(record.conflicts_with.0)?,
            test_mode: record.test_mode,
            history: serde_json::from_value::<Vec<RuleHistoryEntry>>(record.history.0)?,
            created_at: record.created_at,
        })
    }
}

#[derive(Clone)]
pub struct RuleTable;

impl Table for RuleTable {
    fn name(&self) -> &'static str {
        "rules"
    }

    fn create(&self) -> String {
        String::from(
            r#"
            CREATE TABLE IF NOT EXISTS rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                conditions TEXT NOT NULL DEFAULT '[]',
                actions TEXT NOT NULL DEFAULT '[]',
                else_actions TEXT,
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                priority INTEGER NOT NULL DEFAULT 0 CHECK (priority BETWEEN 0 AND 100),
                cooldown INTEGER NOT NULL DEFAULT 0,
                max_executions INTEGER NOT NULL DEFAULT 0,
                execution_count INTEGER NOT NULL DEFAULT 0,
                last_executed DATETIME,
                last_result TEXT,
                depends_on TEXT NOT NULL DEFAULT '[]',
                conflicts_with TEXT NOT NULL DEFAULT '[]',
                test_mode BOOLEAN NOT NULL DEFAULT FALSE,
                history TEXT NOT NULL DEFAULT '[]',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#
        )
    }

    fn dispose(&self) -> String {
        String::from("DROP TABLE IF EXISTS rules;")
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }
}
