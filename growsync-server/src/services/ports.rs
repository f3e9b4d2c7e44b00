//! Seams between the engine and the outside world.

use std::error::Error;

use async_trait::async_trait;
use growsync_api::models::{
    ActuatorCommand, Alert, AutomationConfig, Id, Rule, RuleHistoryEntry, RuleStats, VpdConfig,
};
use time::{OffsetDateTime, UtcOffset};

use crate::errors::{ActuatorError, StoreError};

#[async_trait]
pub trait ActuatorChannel: Send + Sync {
    async fn send(&self, command: &ActuatorCommand) -> Result<(), ActuatorError>;
}

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Enabled rules, highest priority first.
    async fn load_enabled_rules(&self) -> Result<Vec<Rule>, StoreError>;

    async fn find_rule(&self, id: Id) -> Result<Option<Rule>, StoreError>;

    /// Writes execution statistics without touching the rest of the rule.
    async fn save_rule_stats(&self, id: Id, stats: &RuleStats) -> Result<(), StoreError>;

    async fn set_rule_enabled(&self, id: Id, enabled: bool) -> Result<(), StoreError>;

    /// Appends a test-mode entry, trimming history to its cap.
    async fn append_rule_history(&self, id: Id, entry: &RuleHistoryEntry) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_vpd_config(&self) -> Result<Option<VpdConfig>, StoreError>;

    async fn save_vpd_config(&self, config: &VpdConfig) -> Result<(), StoreError>;

    async fn load_automation_config(&self) -> Result<Option<AutomationConfig>, StoreError>;

    async fn save_automation_config(&self, config: &AutomationConfig) -> Result<(), StoreError>;
}

/// Fire-and-forget alert sink. Must never block the caller.
pub trait AlertSink: Send + Sync {
    fn send_alert(&self, alert: Alert);
}

/// Outbound delivery of alerts to people, e.g. a webhook.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<(), Box<dyn Error + Send + Sync>>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// Wall clock shifted to the installation's local offset.
pub struct SystemClock {
    offset: UtcOffset,
}

impl SystemClock {
    pub fn new(utc_offset_hours: i8) -> Self {
        let offset = UtcOffset::from_hms(utc_offset_hours.clamp(-23, 23), 0, 0).unwrap_or(UtcOffset::UTC);
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}
