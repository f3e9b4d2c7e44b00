use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::ValidationError;
use crate::models::{Action, Condition, Id};

/// Upper bound on the test-mode history kept per rule.
pub const MAX_RULE_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleResult {
    Success,
    Failed,
    Skipped,
}

impl RuleResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleResult::Success => "success",
            RuleResult::Failed => "failed",
            RuleResult::Skipped => "skipped",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(RuleResult::Success),
            "failed" => Some(RuleResult::Failed),
            "skipped" => Some(RuleResult::Skipped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleStats {
    /// Number of executions that ran an action list
    #[serde(default)]
    pub execution_count: u64,
    /// Start of the most recent execution
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_executed: Option<OffsetDateTime>,
    /// Outcome of the most recent execution or skip
    #[serde(default)]
    pub last_result: Option<RuleResult>,
}

/// Dry-run record kept for rules in test mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleHistoryEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Result of the condition fold
    pub conditions_met: bool,
    /// Actions that would have run
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<Action>,
    /// Runs when the conditions are not met
    #[serde(default)]
    pub else_actions: Option<Vec<Action>>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// 0..=100, higher runs first
    #[serde(default)]
    pub priority: u8,
    /// Minimum seconds between executions
    #[serde(default)]
    pub cooldown: u64,
    /// Execution cap, zero means unlimited
    #[serde(default)]
    pub max_executions: u64,
    #[serde(default)]
    pub stats: RuleStats,
    /// Rules that must be enabled for this one to run
    #[serde(default)]
    pub depends_on: Vec<Id>,
    /// Rules whose recent execution blocks this one
    #[serde(default)]
    pub conflicts_with: Vec<Id>,
    /// Evaluate and record without acting
    #[serde(default)]
    pub test_mode: bool,
    #[serde(default)]
    pub history: Vec<RuleHistoryEntry>,
    #[serde(default = "OffsetDateTime::now_utc", with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

fn enabled_by_default() -> bool {
    true
}

/// Why a rule may not run right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionBlock {
    Disabled,
    MaxExecutionsReached(u64),
    Cooldown { remaining_seconds: i64 },
}

impl fmt::Display for ExecutionBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionBlock::Disabled => write!(f, "rule is disabled"),
            ExecutionBlock::MaxExecutionsReached(max) => write!(f, "reached {max} executions"),
            ExecutionBlock::Cooldown { remaining_seconds } => {
                write!(f, "cooling down for another {remaining_seconds}s")
            }
        }
    }
}

impl Rule {
    pub fn new(name: &str, created_at: OffsetDateTime) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            description: None,
            conditions: Vec::new(),
            actions: Vec::new(),
            else_actions: None,
            enabled: true,
            priority: 0,
            cooldown: 0,
            max_executions: 0,
            stats: RuleStats::default(),
            depends_on: Vec::new(),
            conflicts_with: Vec::new(),
            test_mode: false,
            history: Vec::new(),
            created_at,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyRuleName);
        }
        if self.priority > 100 {
            return Err(ValidationError::PriorityOutOfRange(self.priority));
        }
        for condition in &self.conditions {
            condition.validate()?;
        }
        for action in self.actions.iter().chain(self.else_actions.iter().flatten()) {
            action.validate(self.id)?;
        }
        Ok(())
    }

    /// Cooldown and execution cap gate, checked before anything else.
    pub fn can_execute(&self, now: OffsetDateTime) -> Result<(), ExecutionBlock> {
        if !self.enabled {
            return Err(ExecutionBlock::Disabled);
        }
        if self.max_executions > 0 && self.stats.execution_count >= self.max_executions {
            return Err(ExecutionBlock::MaxExecutionsReached(self.max_executions));
        }
        if let Some(remaining) = self.cooldown_remaining(now) {
            return Err(ExecutionBlock::Cooldown {
                remaining_seconds: remaining.whole_seconds().max(1),
            });
        }
        Ok(())
    }

    pub fn cooldown_remaining(&self, now: OffsetDateTime) -> Option<Duration> {
        let last = self.stats.last_executed?;
        let cooldown = Duration::seconds(i64::try_from(self.cooldown).unwrap_or(i64::MAX));
        let elapsed = now - last;
        (self.cooldown > 0 && elapsed < cooldown).then(|| cooldown - elapsed)
    }

    /// Appends a history entry, dropping the oldest beyond the cap.
    pub fn push_history(&mut self, entry: RuleHistoryEntry) {
        self.history.push(entry);
        if self.history.len() > MAX_RULE_HISTORY {
            let overflow = self.history.len() - MAX_RULE_HISTORY;
            self.history.drain(..overflow);
        }
    }

    /// Evaluation order: priority descending, then newest first, then higher id.
    pub fn evaluation_order(a: &Rule, b: &Rule) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| b.id.cmp(&a.id))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;
    use crate::models::{Comparison, RuleTargetAction};

    fn rule() -> Rule {
        Rule::new("cool down", datetime!(2024-05-01 00:00 UTC))
    }

    #[test]
    fn test_cooldown_gate() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let mut rule = rule();
        rule.cooldown = 300;
        assert_eq!(rule.can_execute(now), Ok(()));

        rule.stats.last_executed = Some(now - Duration::seconds(60));
        assert_eq!(
            rule.can_execute(now),
            Err(ExecutionBlock::Cooldown { remaining_seconds: 240 })
        );

        rule.stats.last_executed = Some(now - Duration::seconds(300));
        assert_eq!(rule.can_execute(now), Ok(()));
    }

    #[test]
    fn test_execution_cap() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let mut rule = rule();
        rule.max_executions = 2;
        rule.stats.execution_count = 2;
        assert_eq!(rule.can_execute(now), Err(ExecutionBlock::MaxExecutionsReached(2)));

        rule.max_executions = 0;
        assert_eq!(rule.can_execute(now), Ok(()));
    }

    #[test]
    fn test_history_is_bounded() {
        let mut rule = rule();
        for minute in 0..(MAX_RULE_HISTORY as i64 + 5) {
            rule.push_history(RuleHistoryEntry {
                timestamp: datetime!(2024-05-01 00:00 UTC) + Duration::minutes(minute),
                conditions_met: true,
                actions: vec![],
            });
        }

        assert_eq!(rule.history.len(), MAX_RULE_HISTORY);
        assert_eq!(rule.history[0].timestamp, datetime!(2024-05-01 00:05 UTC));
    }

    #[test]
    fn test_evaluation_order() {
        let mut low = rule();
        low.id = 1;
        low.priority = 10;
        let mut high_old = rule();
        high_old.id = 2;
        high_old.priority = 80;
        let mut high_new = rule();
        high_new.id = 3;
        high_new.priority = 80;
        high_new.created_at = datetime!(2024-05-02 00:00 UTC);

        let mut rules = vec![low, high_old, high_new];
        rules.sort_by(Rule::evaluation_order);
        let ids: Vec<Id> = rules.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_validation() {
        let mut rule = rule();
        rule.id = 7;
        rule.conditions = vec![Condition::sensor("temp_top", Comparison::GreaterThan, 30.0)];
        assert!(rule.validate().is_ok());

        rule.priority = 101;
        assert_eq!(rule.validate(), Err(ValidationError::PriorityOutOfRange(101)));

        rule.priority = 50;
        rule.actions = vec![Action::Rule { target_rule: 7, target_action: RuleTargetAction::Trigger }];
        assert_eq!(rule.validate(), Err(ValidationError::SelfReference(7)));
    }

    #[test]
    fn test_minimal_payload_defaults() {
        let rule: Rule = serde_json::from_value(json!({
            "name": "lights",
            "actions": [{ "type": "mqtt", "device": "light", "command": "ON" }]
        }))
        .unwrap();

        assert!(rule.enabled);
        assert_eq!(rule.priority, 0);
        assert!(rule.else_actions.is_none());
        assert_eq!(rule.actions, vec![Action::mqtt("light", "ON", serde_json::Value::Null)]);
    }
}
