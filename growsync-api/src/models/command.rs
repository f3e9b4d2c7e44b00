use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command published on the actuator channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActuatorCommand {
    /// Switch a relay on or off
    SetRelay {
        relay: String,
        state: bool,
    },
    /// Drive a PWM output at its native resolution
    SetPwm {
        device: String,
        value: u16,
    },
    /// Set a fan speed in percent
    SetFanSpeed {
        device: String,
        value: u8,
    },
    /// Run a pump for a fixed duration
    Water {
        pump: String,
        duration_seconds: u32,
    },
    /// Device specific command passed through untouched
    Raw {
        device: String,
        command: String,
        #[serde(default)]
        value: Value,
    },
}

impl ActuatorCommand {
    pub fn relay(relay: &str, state: bool) -> Self {
        ActuatorCommand::SetRelay { relay: relay.to_string(), state }
    }

    /// PWM command from a 0..=100 percentage, rescaled to `native_max`.
    pub fn pwm_percent(device: &str, percent: f64, native_max: u16) -> Self {
        let percent = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
        let value = (percent / 100.0 * f64::from(native_max)).round() as u16;
        ActuatorCommand::SetPwm { device: device.to_string(), value }
    }

    /// Device or relay the command addresses.
    pub fn target(&self) -> &str {
        match self {
            ActuatorCommand::SetRelay { relay, .. } => relay,
            ActuatorCommand::SetPwm { device, .. }
            | ActuatorCommand::SetFanSpeed { device, .. }
            | ActuatorCommand::Raw { device, .. } => device,
            ActuatorCommand::Water { pump, .. } => pump,
        }
    }
}
