use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::models::{Id, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTargetAction {
    Enable,
    Disable,
    Trigger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Device command, translated to an actuator command at dispatch time
    Mqtt {
        device: String,
        command: String,
        #[serde(default)]
        value: Value,
    },
    /// Pause before the next action
    Delay { seconds: u64 },
    /// Alert through the notification path
    Notification {
        message: String,
        #[serde(default)]
        severity: Severity,
    },
    /// Operate on another rule
    Rule {
        target_rule: Id,
        target_action: RuleTargetAction,
    },
}

impl Action {
    pub fn mqtt(device: &str, command: &str, value: Value) -> Self {
        Action::Mqtt {
            device: device.to_string(),
            command: command.to_string(),
            value,
        }
    }

    pub fn validate(&self, owner: Id) -> Result<(), ValidationError> {
        match self {
            Action::Mqtt { device, command, .. } if command.trim().is_empty() => {
                Err(ValidationError::EmptyCommand(device.clone()))
            }
            Action::Rule { target_rule, target_action: RuleTargetAction::Trigger }
                if *target_rule == owner && owner != 0 =>
            {
                Err(ValidationError::SelfReference(owner))
            }
            _ => Ok(()),
        }
    }
}
