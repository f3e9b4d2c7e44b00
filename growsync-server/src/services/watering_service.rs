use std::collections::HashMap;

use growsync_api::models::{
    ActuatorCommand, SensorSample, WateringConfig, WateringGroup, WateringMode, saturating_minutes,
};
use time::OffsetDateTime;

use crate::services::Dispatcher;

/// Soil moisture driven pump control with a per-pump cooldown.
#[derive(Default)]
pub struct WateringPolicy {
    last_watered: HashMap<String, OffsetDateTime>,
}

impl WateringPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_watered(&self, pump: &str) -> Option<OffsetDateTime> {
        self.last_watered.get(pump).copied()
    }

    fn needs_water(config: &WateringConfig, group: &WateringGroup, sample: &SensorSample) -> bool {
        let readings: Vec<f64> = group
            .slots
            .iter()
            .filter_map(|slot| sample.soil_moisture_slot(*slot))
            .collect();

        if readings.is_empty() {
            return false;
        }

        match config.mode {
            WateringMode::Average => readings.iter().sum::<f64>() / (readings.len() as f64) < config.threshold,
            WateringMode::PerPlant => readings.iter().any(|reading| *reading < config.threshold),
        }
    }

    /// Waters every dry group whose pump is out of cooldown. Returns the
    /// pumps that were started.
    pub async fn tick(
        &mut self,
        config: &WateringConfig,
        sample: &SensorSample,
        now: OffsetDateTime,
        dispatcher: &Dispatcher,
    ) -> Vec<String> {
        let mut watered = Vec::new();
        if !config.enabled {
            return watered;
        }

        let cooldown = saturating_minutes(config.cooldown_minutes);

        for group in &config.groups {
            if !Self::needs_water(config, group, sample) {
                continue;
            }

            if let Some(last) = self.last_watered(&group.pump) {
                if now - last < cooldown {
                    tracing::debug!("{} dry but cooling down", group.pump);
                    continue;
                }
            }

            let command = ActuatorCommand::Water {
                pump: group.pump.clone(),
                duration_seconds: config.duration_seconds,
            };

            match dispatcher.send(command).await {
                Ok(()) => {
                    tracing::info!("watering with {} for {}s", group.pump, config.duration_seconds);
                    self.last_watered.insert(group.pump.clone(), now);
                    watered.push(group.pump.clone());
                }
                Err(e) => tracing::warn!("Failed to start {}: {}", group.pump, e),
            }
        }

        watered
    }
}
