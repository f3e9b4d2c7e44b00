use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::models::{Action, ActuatorCommand, Alert, Id, SensorSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Then,
    Else,
}

/// What happened to one rule during a scheduler tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OutcomeKind {
    /// All actions of the branch ran
    Executed { branch: Branch, actions: usize },
    /// An action failed; the remaining actions were not run
    Failed { branch: Branch, error: String },
    /// Dependency or conflict check failed
    Skipped { reason: String },
    /// Cooldown, execution cap or disabled
    Blocked { reason: String },
    /// Conditions not met and no else branch
    NotTriggered,
    /// Test mode: recorded, nothing dispatched
    TestLogged { conditions_met: bool },
    /// The rule could not be evaluated
    Invalid { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: Id,
    pub rule_name: String,
    #[serde(flatten)]
    pub kind: OutcomeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// False when no usable sample was available or the interlock had tripped
    pub evaluated: bool,
    pub outcomes: Vec<RuleOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulateRequest {
    /// Sample to evaluate against; the latest live sample when absent
    #[serde(default)]
    pub sample: Option<SensorSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub rule_id: Id,
    /// Per-condition results in list order
    pub condition_results: Vec<bool>,
    pub conditions_met: bool,
    /// Branch that would run
    pub actions: Vec<Action>,
    /// Whether cooldown and execution cap allow a run right now
    pub can_execute: bool,
    #[serde(default)]
    pub blocked_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualActionRequest {
    /// Command forwarded to the actuators, if any
    #[serde(default)]
    pub command: Option<ActuatorCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualActionResponse {
    #[serde(with = "time::serde::rfc3339")]
    pub override_until: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// Rule scheduler running
    pub running: bool,
    pub tick_count: u64,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_tick: Option<OffsetDateTime>,
    pub last_outcomes: Vec<RuleOutcome>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub manual_override_until: Option<OffsetDateTime>,
    pub current_fan_speed: u8,
    #[serde(default)]
    pub last_vpd: Option<f64>,
    #[serde(default)]
    pub light_on: Option<bool>,
    pub safety_trips: u64,
    pub samples_processed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToggleResponse {
    pub running: bool,
}

/// Live events streamed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    Command(ActuatorCommand),
    Alert(Alert),
    SafetyTrip { reasons: Vec<String> },
    RuleOutcome(RuleOutcome),
}
