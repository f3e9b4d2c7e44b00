use growsync_api::models::{ActuatorCommand, LightConfig};
use time::OffsetDateTime;

use crate::services::Dispatcher;

const MINUTES_PER_DAY: i32 = 24 * 60;

/// Whether the photoperiod starting at `start_hour` and lasting
/// `duration_hours` covers `now`. Periods may wrap past midnight.
pub fn light_should_be_on(start_hour: u8, duration_hours: u8, now: OffsetDateTime) -> bool {
    match duration_hours {
        0 => false,
        24.. => true,
        hours => {
            let minute_of_day = i32::from(now.hour()) * 60 + i32::from(now.minute());
            let since_start = (minute_of_day - i32::from(start_hour) * 60).rem_euclid(MINUTES_PER_DAY);
            since_start < i32::from(hours) * 60
        }
    }
}

/// Drives the grow light from the configured schedule, sending commands only
/// on transitions.
pub struct LightScheduler {
    light: String,
    pwm_native_max: u16,
    state: Option<bool>,
}

impl LightScheduler {
    pub fn new(light: String, pwm_native_max: u16) -> Self {
        Self { light, pwm_native_max, state: None }
    }

    /// Last state the light was successfully switched to.
    pub fn state(&self) -> Option<bool> {
        self.state
    }

    /// Forgets the tracked state so the next tick re-sends the schedule.
    pub fn invalidate(&mut self) {
        self.state = None;
    }

    pub async fn tick(&mut self, config: &LightConfig, now: OffsetDateTime, dispatcher: &Dispatcher) -> Option<bool> {
        if !config.enabled {
            return self.state;
        }

        let on = light_should_be_on(config.schedule.start_hour(), config.schedule.duration_hours(), now);
        if self.state == Some(on) {
            return self.state;
        }

        if let Err(e) = dispatcher.send(ActuatorCommand::relay(&self.light, on)).await {
            tracing::warn!("Failed to switch light {}: {}", if on { "on" } else { "off" }, e);
            return self.state;
        }

        if let Some(intensity) = config.intensity.filter(|_| on) {
            let command = ActuatorCommand::pwm_percent(&self.light, f64::from(intensity), self.pwm_native_max);
            if let Err(e) = dispatcher.send(command).await {
                tracing::warn!("Failed to set light intensity: {}", e);
            }
        }

        tracing::info!("light switched {}", if on { "on" } else { "off" });
        self.state = Some(on);
        self.state
    }
}
