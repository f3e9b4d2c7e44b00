use growsync_analyser::{Aggressiveness, GrowthStage, VpdBand, VpdStatistics};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::error::ValidationError;
use crate::models::Zone;

/// Upper bound for configured pauses and cooldowns, one week.
pub const MAX_PAUSE_MINUTES: u64 = 7 * 24 * 60;

/// Upper bound for configured intervals in seconds, one week.
pub const MAX_INTERVAL_SECONDS: u64 = MAX_PAUSE_MINUTES * 60;

/// Seconds as a [`Duration`], saturating instead of wrapping.
pub fn saturating_seconds(seconds: u64) -> Duration {
    Duration::seconds(i64::try_from(seconds).unwrap_or(i64::MAX))
}

/// Minutes as a [`Duration`], saturating instead of overflowing.
pub fn saturating_minutes(minutes: u64) -> Duration {
    Duration::seconds(i64::try_from(minutes).unwrap_or(i64::MAX).saturating_mul(60))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanLimits {
    pub min: u8,
    pub max: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hysteresis {
    pub enabled: bool,
    /// VPD change below which a reading is ignored, kPa
    pub threshold: f64,
    /// Minimum seconds between two fan changes
    pub min_seconds_between_changes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyAction {
    MinFan,
    MaxFan,
    Disable,
    AlertOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmergencyThreshold {
    /// VPD in kPa
    pub threshold: f64,
    pub action: EmergencyAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmergencyThresholds {
    pub critical_low: EmergencyThreshold,
    pub critical_high: EmergencyThreshold,
}

/// Per-zone control. Zones without an explicit band use the main target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneControl {
    pub enabled: bool,
    #[serde(default)]
    pub bottom: Option<VpdBand>,
    #[serde(default)]
    pub middle: Option<VpdBand>,
    #[serde(default)]
    pub top: Option<VpdBand>,
}

impl ZoneControl {
    pub fn band(&self, zone: Zone) -> Option<VpdBand> {
        match zone {
            Zone::Bottom => self.bottom,
            Zone::Middle => self.middle,
            Zone::Top => self.top,
        }
    }
}

/// VPD controller configuration together with its persisted runtime state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VpdConfig {
    pub enabled: bool,
    pub growth_stage: GrowthStage,
    /// Overrides the growth stage band
    pub custom_target: Option<VpdBand>,
    pub aggressiveness: Aggressiveness,
    pub fan_limits: FanLimits,
    /// Minimum seconds between two evaluations
    pub update_interval_seconds: u64,
    pub hysteresis: Hysteresis,
    pub emergency: EmergencyThresholds,
    pub zone_control: ZoneControl,
    /// Fan speed in percent
    pub current_fan_speed: u8,
    pub last_vpd: Option<f64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_update: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_change: Option<OffsetDateTime>,
    pub statistics: VpdStatistics,
}

impl Default for VpdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            growth_stage: GrowthStage::Vegetative,
            custom_target: None,
            aggressiveness: Aggressiveness::Normal,
            fan_limits: FanLimits { min: 20, max: 100 },
            update_interval_seconds: 30,
            hysteresis: Hysteresis {
                enabled: true,
                threshold: 0.05,
                min_seconds_between_changes: 120,
            },
            emergency: EmergencyThresholds {
                critical_low: EmergencyThreshold { threshold: 0.3, action: EmergencyAction::MinFan },
                critical_high: EmergencyThreshold { threshold: 2.0, action: EmergencyAction::MaxFan },
            },
            zone_control: ZoneControl::default(),
            current_fan_speed: 50,
            last_vpd: None,
            last_update: None,
            last_change: None,
            statistics: VpdStatistics::default(),
        }
    }
}

impl VpdConfig {
    /// Custom target when set, otherwise the growth stage band.
    pub fn target_band(&self) -> VpdBand {
        self.custom_target.unwrap_or_else(|| self.growth_stage.target_band())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(band) = &self.custom_target {
            band.validate()?;
        }
        for zone in Zone::ALL {
            if let Some(band) = self.zone_control.band(zone) {
                band.validate()?;
            }
        }
        let FanLimits { min, max } = self.fan_limits;
        if min > max || max > 100 {
            return Err(ValidationError::FanLimits { min, max });
        }
        if self.update_interval_seconds > MAX_INTERVAL_SECONDS
            || self.hysteresis.min_seconds_between_changes > MAX_INTERVAL_SECONDS
        {
            return Err(ValidationError::Config(format!(
                "VPD intervals are limited to {MAX_INTERVAL_SECONDS} seconds"
            )));
        }
        if self.emergency.critical_low.threshold >= self.emergency.critical_high.threshold {
            return Err(ValidationError::Config(
                "emergency critical_low must be below critical_high".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Any zone above this temperature trips the interlock, Celsius
    pub max_temp_safe: f64,
    /// Gas concentration above this trips the interlock, ppm
    pub max_gas_safe: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LightSchedule {
    /// Fixed on period starting at `start_hour`
    Fixed { start_hour: u8, duration_hours: u8 },
    /// Photoperiod taken from the growth stage
    GrowthStage { start_hour: u8, stage: GrowthStage },
}

impl LightSchedule {
    pub fn start_hour(&self) -> u8 {
        match self {
            LightSchedule::Fixed { start_hour, .. } | LightSchedule::GrowthStage { start_hour, .. } => *start_hour,
        }
    }

    pub fn duration_hours(&self) -> u8 {
        match self {
            LightSchedule::Fixed { duration_hours, .. } => *duration_hours,
            LightSchedule::GrowthStage { stage, .. } => stage.photoperiod_hours(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightConfig {
    pub enabled: bool,
    pub schedule: LightSchedule,
    /// PWM intensity in percent applied when switching on
    #[serde(default)]
    pub intensity: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WateringMode {
    /// Water when the group's mean moisture is below threshold
    Average,
    /// Water when any slot in the group is below threshold
    PerPlant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WateringGroup {
    pub pump: String,
    /// 1-based soil moisture slots fed by this pump
    pub slots: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WateringConfig {
    pub enabled: bool,
    pub mode: WateringMode,
    /// Soil moisture percentage below which a group is watered
    pub threshold: f64,
    pub cooldown_minutes: u64,
    pub duration_seconds: u32,
    pub groups: Vec<WateringGroup>,
}

/// Runtime automation settings, persisted and patchable over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    pub safety: SafetyLimits,
    /// Length of the manual override window
    pub manual_pause_minutes: u64,
    /// A rule is skipped when a conflicting rule ran within this many seconds
    pub conflict_window_seconds: u64,
    pub light: LightConfig,
    pub watering: WateringConfig,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            safety: SafetyLimits { max_temp_safe: 40.0, max_gas_safe: 1000.0 },
            manual_pause_minutes: 30,
            conflict_window_seconds: 60,
            light: LightConfig {
                enabled: true,
                schedule: LightSchedule::GrowthStage { start_hour: 6, stage: GrowthStage::Vegetative },
                intensity: None,
            },
            watering: WateringConfig {
                enabled: true,
                mode: WateringMode::Average,
                threshold: 30.0,
                cooldown_minutes: 60,
                duration_seconds: 10,
                groups: vec![
                    WateringGroup { pump: "pump_1".into(), slots: vec![1, 2] },
                    WateringGroup { pump: "pump_2".into(), slots: vec![3, 4] },
                ],
            },
        }
    }
}

impl AutomationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let SafetyLimits { max_temp_safe, max_gas_safe } = self.safety;
        if !max_temp_safe.is_finite() || !max_gas_safe.is_finite() {
            return Err(ValidationError::Config("safety limits must be finite".into()));
        }
        if self.manual_pause_minutes > MAX_PAUSE_MINUTES {
            return Err(ValidationError::Config(format!(
                "manual pause is limited to {MAX_PAUSE_MINUTES} minutes"
            )));
        }
        if self.watering.cooldown_minutes > MAX_PAUSE_MINUTES {
            return Err(ValidationError::Config(format!(
                "watering cooldown is limited to {MAX_PAUSE_MINUTES} minutes"
            )));
        }
        let start_hour = self.light.schedule.start_hour();
        if start_hour > 23 {
            return Err(ValidationError::LightHour(start_hour));
        }
        if self.light.schedule.duration_hours() > 24 {
            return Err(ValidationError::Config("light duration exceeds 24 hours".into()));
        }
        if self.light.intensity.is_some_and(|intensity| intensity > 100) {
            return Err(ValidationError::Config("light intensity is a percentage".into()));
        }
        for group in &self.watering.groups {
            if let Some(slot) = group.slots.iter().find(|slot| **slot == 0) {
                return Err(ValidationError::SoilSlot { pump: group.pump.clone(), slot: *slot });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_target_band_prefers_custom() {
        let mut config = VpdConfig::default();
        assert_eq!(config.target_band(), GrowthStage::Vegetative.target_band());

        config.custom_target = Some(VpdBand::new(0.9, 1.1).unwrap());
        assert_eq!(config.target_band().min, 0.9);
    }

    #[test]
    fn test_partial_vpd_config_uses_defaults() {
        let config: VpdConfig = serde_json::from_value(json!({
            "growth_stage": "flowering",
            "aggressiveness": "aggressive"
        }))
        .unwrap();

        assert_eq!(config.growth_stage, GrowthStage::Flowering);
        assert_eq!(config.fan_limits, FanLimits { min: 20, max: 100 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_light_schedule_duration() {
        let schedule: LightSchedule = serde_json::from_value(json!({
            "mode": "growth_stage",
            "start_hour": 6,
            "stage": "flowering"
        }))
        .unwrap();

        assert_eq!(schedule.duration_hours(), 12);
    }

    #[test]
    fn test_automation_validation() {
        let mut config = AutomationConfig::default();
        assert!(config.validate().is_ok());

        config.watering.groups[0].slots = vec![0];
        assert!(matches!(config.validate(), Err(ValidationError::SoilSlot { slot: 0, .. })));
    }

    #[test]
    fn test_pauses_are_bounded() {
        let mut config = AutomationConfig { manual_pause_minutes: MAX_PAUSE_MINUTES, ..AutomationConfig::default() };
        assert!(config.validate().is_ok());

        config.manual_pause_minutes = 10_000_000_000;
        assert!(matches!(config.validate(), Err(ValidationError::Config(_))));

        let mut config = AutomationConfig::default();
        config.watering.cooldown_minutes = u64::MAX;
        assert!(matches!(config.validate(), Err(ValidationError::Config(_))));

        let mut vpd = VpdConfig::default();
        vpd.update_interval_seconds = u64::MAX;
        assert!(matches!(vpd.validate(), Err(ValidationError::Config(_))));
    }

    #[test]
    fn test_saturating_durations() {
        assert_eq!(saturating_minutes(30), Duration::minutes(30));
        assert_eq!(saturating_seconds(u64::MAX), Duration::seconds(i64::MAX));
        assert_eq!(saturating_minutes(u64::MAX), Duration::seconds(i64::MAX));
    }
}
