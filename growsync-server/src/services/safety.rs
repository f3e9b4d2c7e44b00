use std::fmt;

use growsync_api::models::{ActuatorCommand, Alert, EngineEvent, SafetyLimits, SensorSample, Severity};
use time::OffsetDateTime;

use crate::configs::Actuators;
use crate::services::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SafetyViolation {
    OverTemperature { reading: f64, limit: f64 },
    GasConcentration { reading: f64, limit: f64 },
}

impl fmt::Display for SafetyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyViolation::OverTemperature { reading, limit } => {
                write!(f, "temperature {reading:.1}°C above {limit:.1}°C")
            }
            SafetyViolation::GasConcentration { reading, limit } => {
                write!(f, "gas {reading:.0}ppm above {limit:.0}ppm")
            }
        }
    }
}

/// Hard cut-off that runs before every other controller on each sample.
pub struct SafetyInterlock {
    shutdown: Vec<ActuatorCommand>,
}

impl SafetyInterlock {
    pub fn new(actuators: &Actuators) -> Self {
        let devices = [
            &actuators.light,
            &actuators.pump_1,
            &actuators.pump_2,
            &actuators.fan_intake,
            &actuators.fan_exhaust,
            &actuators.humidifier,
            &actuators.dehumidifier,
            &actuators.vpd_fan,
        ];

        let mut shutdown: Vec<ActuatorCommand> = Vec::with_capacity(devices.len());
        for device in devices {
            if !shutdown.iter().any(|command| command.target() == device.as_str()) {
                shutdown.push(ActuatorCommand::relay(device, false));
            }
        }

        Self { shutdown }
    }

    pub fn shutdown_commands(&self) -> &[ActuatorCommand] {
        &self.shutdown
    }

    /// Every limit the sample breaches; empty when safe.
    pub fn evaluate(&self, sample: &SensorSample, limits: &SafetyLimits) -> Vec<SafetyViolation> {
        let mut violations = Vec::new();

        if let Some(reading) = sample.max_temperature() {
            if reading > limits.max_temp_safe {
                violations.push(SafetyViolation::OverTemperature { reading, limit: limits.max_temp_safe });
            }
        }

        if let Some(reading) = sample.gas.filter(|gas| gas.is_finite()) {
            if reading > limits.max_gas_safe {
                violations.push(SafetyViolation::GasConcentration { reading, limit: limits.max_gas_safe });
            }
        }

        violations
    }

    /// Switches every actuator off and raises a critical alert. Each off
    /// command is attempted even when an earlier one fails; the alert goes
    /// out last so a notification problem cannot hold up the shutdown.
    pub async fn trip(&self, violations: &[SafetyViolation], dispatcher: &Dispatcher, now: OffsetDateTime) {
        for command in &self.shutdown {
            if let Err(e) = dispatcher.send(command.clone()).await {
                tracing::error!("safety shutdown of {} failed: {}", command.target(), e);
            }
        }

        let reasons: Vec<String> = violations.iter().map(ToString::to_string).collect();
        tracing::error!("safety interlock tripped: {}", reasons.join(", "));

        dispatcher.alert(Alert::new(
            "Safety interlock",
            format!("All actuators switched off: {}", reasons.join(", ")),
            Severity::Critical,
            now,
        ));
        dispatcher.publish(EngineEvent::SafetyTrip { reasons });
    }
}
