use std::sync::Arc;
use std::time::Duration as StdDuration;

use growsync_analyser::{VpdBand, next_fan_speed};
use growsync_api::models::{
    ActuatorCommand, Alert, EmergencyAction, SensorSample, Severity, VpdConfig, Zone, saturating_seconds,
};
use time::OffsetDateTime;

use crate::services::{ConfigStore, Dispatcher, with_timeout};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VpdSkip {
    Interval,
    NoReading,
    Hysteresis,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VpdTick {
    Skipped(VpdSkip),
    /// Controller disabled, two-state fan fallback applied
    Fallback { vpd: f64, fan_on: Option<bool> },
    Held { vpd: f64 },
    Adjusted { vpd: f64, from: u8, to: u8 },
    Emergency { vpd: f64, action: EmergencyAction },
    DispatchFailed { vpd: f64, error: String },
}

/// Closed-loop fan control on vapour pressure deficit.
///
/// The controller owns its [`VpdConfig`] including the runtime fields; the
/// in-memory copy is authoritative and written through to the store after
/// every evaluated tick.
pub struct VpdController {
    config: VpdConfig,
    fan: String,
    fallback_fan_on: Option<bool>,
    store: Arc<dyn ConfigStore>,
    persistence_timeout: StdDuration,
}

impl VpdController {
    pub fn new(
        config: VpdConfig,
        fan: String,
        store: Arc<dyn ConfigStore>,
        persistence_timeout: StdDuration,
    ) -> Self {
        Self {
            config,
            fan,
            fallback_fan_on: None,
            store,
            persistence_timeout,
        }
    }

    pub fn config(&self) -> &VpdConfig {
        &self.config
    }

    /// Reading and target the controller steers by. With zone control the
    /// zone furthest from its own optimum wins.
    fn reading(&self, sample: &SensorSample) -> Option<(f64, VpdBand)> {
        let target = self.config.target_band();

        if !self.config.zone_control.enabled {
            return sample.vpd().map(|vpd| (vpd, target));
        }

        Zone::ALL
            .iter()
            .filter_map(|zone| {
                let band = self.config.zone_control.band(*zone).unwrap_or(target);
                sample.zone_vpd(*zone).map(|vpd| (vpd, band))
            })
            .max_by(|(a, band_a), (b, band_b)| band_a.deviation(*a).total_cmp(&band_b.deviation(*b)))
            .or_else(|| sample.vpd().map(|vpd| (vpd, target)))
    }

    pub async fn tick(&mut self, sample: &SensorSample, now: OffsetDateTime, dispatcher: &Dispatcher) -> VpdTick {
        if !self.config.enabled {
            return self.fallback(sample, dispatcher).await;
        }

        let interval = saturating_seconds(self.config.update_interval_seconds);
        if self.config.last_update.is_some_and(|last| now - last < interval) {
            return VpdTick::Skipped(VpdSkip::Interval);
        }

        let Some((vpd, band)) = self.reading(sample) else {
            return VpdTick::Skipped(VpdSkip::NoReading);
        };

        if self.within_hysteresis(vpd, now) {
            tracing::trace!("VPD {vpd:.3} kPa within hysteresis");
            return VpdTick::Skipped(VpdSkip::Hysteresis);
        }

        let emergency = &self.config.emergency;
        let emergency_action = if vpd < emergency.critical_low.threshold {
            Some(emergency.critical_low.action)
        } else if vpd > emergency.critical_high.threshold {
            Some(emergency.critical_high.action)
        } else {
            None
        };

        let outcome = match emergency_action {
            Some(action) => self.emergency(vpd, action, band, now, dispatcher).await,
            None => {
                let current = self.config.current_fan_speed;
                let next = next_fan_speed(vpd, &band, current, self.config.aggressiveness);
                let next = if next == current {
                    current
                } else {
                    next.clamp(self.config.fan_limits.min, self.config.fan_limits.max)
                };

                if next == current {
                    VpdTick::Held { vpd }
                } else {
                    self.change_speed(vpd, next, band, now, dispatcher).await
                }
            }
        };

        self.config.last_vpd = Some(vpd);
        self.config.last_update = Some(now);
        self.persist().await;

        outcome
    }

    fn within_hysteresis(&self, vpd: f64, now: OffsetDateTime) -> bool {
        let hysteresis = &self.config.hysteresis;
        if !hysteresis.enabled {
            return false;
        }

        let Some(last_vpd) = self.config.last_vpd else {
            return false;
        };

        let min_gap = saturating_seconds(hysteresis.min_seconds_between_changes);
        let changed_recently = self.config.last_change.is_some_and(|change| now - change < min_gap);

        (vpd - last_vpd).abs() < hysteresis.threshold && changed_recently
    }

    async fn emergency(
        &mut self,
        vpd: f64,
        action: EmergencyAction,
        band: VpdBand,
        now: OffsetDateTime,
        dispatcher: &Dispatcher,
    ) -> VpdTick {
        tracing::warn!("VPD {vpd:.2} kPa past emergency threshold, applying {action:?}");
        dispatcher.alert(Alert::new(
            "VPD emergency",
            format!("VPD {vpd:.2} kPa is outside the critical range, action {action:?}"),
            Severity::Critical,
            now,
        ));

        let target = match action {
            EmergencyAction::MinFan => Some(self.config.fan_limits.min),
            EmergencyAction::MaxFan => Some(self.config.fan_limits.max),
            EmergencyAction::Disable => {
                self.config.enabled = false;
                None
            }
            EmergencyAction::AlertOnly => None,
        };

        if let Some(target) = target.filter(|target| *target != self.config.current_fan_speed) {
            if let VpdTick::DispatchFailed { vpd, error } = self.change_speed(vpd, target, band, now, dispatcher).await {
                return VpdTick::DispatchFailed { vpd, error };
            }
        }

        VpdTick::Emergency { vpd, action }
    }

    async fn change_speed(
        &mut self,
        vpd: f64,
        speed: u8,
        band: VpdBand,
        now: OffsetDateTime,
        dispatcher: &Dispatcher,
    ) -> VpdTick {
        let from = self.config.current_fan_speed;
        let command = ActuatorCommand::SetFanSpeed { device: self.fan.clone(), value: speed };

        if let Err(e) = dispatcher.send(command).await {
            tracing::warn!("VPD fan change {from}% -> {speed}% failed: {}", e);
            return VpdTick::DispatchFailed { vpd, error: e.to_string() };
        }

        let elapsed = self
            .config
            .last_update
            .map(|last| (now - last).as_seconds_f64())
            .unwrap_or(0.0);
        self.config.statistics.record(vpd, elapsed, band.contains(vpd));
        self.config.current_fan_speed = speed;
        self.config.last_change = Some(now);

        tracing::info!("VPD {vpd:.2} kPa (target {:.2}), fan {from}% -> {speed}%", band.optimal);

        VpdTick::Adjusted { vpd, from, to: speed }
    }

    /// Two-state control used while the controller is disabled: fan on below
    /// the band, off above it, untouched inside.
    async fn fallback(&mut self, sample: &SensorSample, dispatcher: &Dispatcher) -> VpdTick {
        let Some(vpd) = sample.vpd() else {
            return VpdTick::Skipped(VpdSkip::NoReading);
        };

        let band = self.config.target_band();
        let desired = if vpd < band.min {
            Some(true)
        } else if vpd > band.max {
            Some(false)
        } else {
            None
        };

        if let Some(on) = desired.filter(|on| self.fallback_fan_on != Some(*on)) {
            match dispatcher.send(ActuatorCommand::relay(&self.fan, on)).await {
                Ok(()) => self.fallback_fan_on = Some(on),
                Err(e) => tracing::warn!("VPD fallback fan switch failed: {}", e),
            }
        }

        VpdTick::Fallback { vpd, fan_on: self.fallback_fan_on }
    }

    async fn persist(&self) {
        let result = with_timeout(
            "VPD config save",
            self.persistence_timeout,
            self.store.save_vpd_config(&self.config),
        )
        .await;

        if let Err(e) = result {
            tracing::warn!("Failed to persist VPD state, keeping in-memory state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use growsync_api::models::{ActuatorCommand, GrowthStage};
    use time::Duration;
    use time::macros::datetime;

    use super::*;
    use crate::tests::{MemoryConfigStore, TestHarness};

    fn sample_with(temp: f64, humidity: f64, now: OffsetDateTime) -> SensorSample {
        let mut sample = SensorSample::new(now);
        sample.temp_middle = Some(temp);
        sample.humidity_middle = Some(humidity);
        sample
    }

    fn controller(config: VpdConfig, store: Arc<MemoryConfigStore>) -> VpdController {
        VpdController::new(config, "fan_exhaust".into(), store, StdDuration::from_millis(200))
    }

    fn eager_config() -> VpdConfig {
        VpdConfig {
            update_interval_seconds: 0,
            growth_stage: GrowthStage::Vegetative,
            ..VpdConfig::default()
        }
    }

    #[tokio::test]
    async fn test_high_vpd_speeds_fan_up() {
        let harness = TestHarness::new();
        let store = Arc::new(MemoryConfigStore::default());
        let mut controller = controller(eager_config(), store.clone());
        let now = datetime!(2024-05-01 12:00 UTC);

        // 25°C / 57.7% is about 1.34 kPa: 0.34 above the vegetative optimum
        let tick = controller.tick(&sample_with(25.0, 57.7, now), now, &harness.dispatcher).await;

        assert!(matches!(tick, VpdTick::Adjusted { from: 50, to: 70, .. }), "{tick:?}");
        assert_eq!(
            harness.actuator.commands(),
            vec![ActuatorCommand::SetFanSpeed { device: "fan_exhaust".into(), value: 70 }]
        );
        assert_eq!(controller.config().statistics.adjustments, 1);
        assert_eq!(store.vpd_config().unwrap().current_fan_speed, 70);
    }

    #[tokio::test]
    async fn test_dead_zone_sends_nothing() {
        let harness = TestHarness::new();
        let mut controller = controller(eager_config(), Arc::new(MemoryConfigStore::default()));
        let now = datetime!(2024-05-01 12:00 UTC);

        // 25°C / 68% is about 1.02 kPa
        let tick = controller.tick(&sample_with(25.0, 68.0, now), now, &harness.dispatcher).await;

        assert!(matches!(tick, VpdTick::Held { .. }), "{tick:?}");
        assert!(harness.actuator.commands().is_empty());
        assert_eq!(controller.config().last_update, Some(now));
    }

    #[tokio::test]
    async fn test_update_interval_and_hysteresis() {
        let harness = TestHarness::new();
        let config = VpdConfig { update_interval_seconds: 60, ..VpdConfig::default() };
        let mut controller = controller(config, Arc::new(MemoryConfigStore::default()));
        let start = datetime!(2024-05-01 12:00 UTC);

        let first = controller.tick(&sample_with(25.0, 57.7, start), start, &harness.dispatcher).await;
        assert!(matches!(first, VpdTick::Adjusted { .. }));

        let early = start + Duration::seconds(30);
        let tick = controller.tick(&sample_with(25.0, 57.7, early), early, &harness.dispatcher).await;
        assert_eq!(tick, VpdTick::Skipped(VpdSkip::Interval));

        let later = start + Duration::seconds(90);
        let tick = controller.tick(&sample_with(25.0, 57.8, later), later, &harness.dispatcher).await;
        assert_eq!(tick, VpdTick::Skipped(VpdSkip::Hysteresis));
        assert_eq!(harness.actuator.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_huge_interval_saturates() {
        let harness = TestHarness::new();
        let config = VpdConfig { update_interval_seconds: u64::MAX, ..VpdConfig::default() };
        let mut controller = controller(config, Arc::new(MemoryConfigStore::default()));
        let start = datetime!(2024-05-01 12:00 UTC);

        let first = controller.tick(&sample_with(25.0, 57.7, start), start, &harness.dispatcher).await;
        assert!(matches!(first, VpdTick::Adjusted { .. }));

        let next_year = start + Duration::days(365);
        let tick = controller.tick(&sample_with(25.0, 40.0, next_year), next_year, &harness.dispatcher).await;
        assert_eq!(tick, VpdTick::Skipped(VpdSkip::Interval));
    }

    #[tokio::test]
    async fn test_emergency_high_forces_max_fan() {
        let harness = TestHarness::new();
        let mut controller = controller(eager_config(), Arc::new(MemoryConfigStore::default()));
        let now = datetime!(2024-05-01 12:00 UTC);

        // 30°C / 30% is about 2.97 kPa
        let tick = controller.tick(&sample_with(30.0, 30.0, now), now, &harness.dispatcher).await;

        assert!(matches!(tick, VpdTick::Emergency { action: EmergencyAction::MaxFan, .. }), "{tick:?}");
        assert_eq!(controller.config().current_fan_speed, 100);
        assert_eq!(harness.alerts.alerts().len(), 1);
        assert_eq!(harness.alerts.alerts()[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_dispatch_failure_keeps_speed() {
        let harness = TestHarness::new();
        harness.actuator.fail_sends(true);
        let mut controller = controller(eager_config(), Arc::new(MemoryConfigStore::default()));
        let now = datetime!(2024-05-01 12:00 UTC);

        let tick = controller.tick(&sample_with(25.0, 57.7, now), now, &harness.dispatcher).await;

        assert!(matches!(tick, VpdTick::DispatchFailed { .. }), "{tick:?}");
        assert_eq!(controller.config().current_fan_speed, 50);
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_in_memory_state() {
        let harness = TestHarness::new();
        let store = Arc::new(MemoryConfigStore::default());
        store.fail_saves(true);
        let mut controller = controller(eager_config(), store.clone());
        let now = datetime!(2024-05-01 12:00 UTC);

        controller.tick(&sample_with(25.0, 57.7, now), now, &harness.dispatcher).await;

        assert_eq!(controller.config().current_fan_speed, 70);
        assert!(store.vpd_config().is_none());
    }

    #[tokio::test]
    async fn test_zone_control_follows_worst_zone() {
        let harness = TestHarness::new();
        let mut config = eager_config();
        config.zone_control.enabled = true;
        let mut controller = controller(config, Arc::new(MemoryConfigStore::default()));
        let now = datetime!(2024-05-01 12:00 UTC);

        let mut sample = sample_with(25.0, 68.0, now);
        sample.temp_bottom = Some(22.0);
        sample.humidity_bottom = Some(70.0);
        sample.temp_top = Some(27.0);
        sample.humidity_top = Some(55.0);

        let tick = controller.tick(&sample, now, &harness.dispatcher).await;

        // the top zone sits near 1.6 kPa and drives the fan to its maximum
        assert!(matches!(tick, VpdTick::Adjusted { to: 85, .. }), "{tick:?}");
    }

    #[tokio::test]
    async fn test_disabled_controller_uses_two_state_fallback() {
        let harness = TestHarness::new();
        let config = VpdConfig { enabled: false, ..eager_config() };
        let mut controller = controller(config, Arc::new(MemoryConfigStore::default()));
        let now = datetime!(2024-05-01 12:00 UTC);

        // 22°C / 80% is about 0.53 kPa, below the band
        let tick = controller.tick(&sample_with(22.0, 80.0, now), now, &harness.dispatcher).await;
        assert!(matches!(tick, VpdTick::Fallback { fan_on: Some(true), .. }), "{tick:?}");

        controller.tick(&sample_with(22.0, 80.0, now), now, &harness.dispatcher).await;
        assert_eq!(harness.actuator.commands(), vec![ActuatorCommand::relay("fan_exhaust", true)]);

        // 25°C / 68% sits inside the band: state is kept
        let tick = controller.tick(&sample_with(25.0, 68.0, now), now, &harness.dispatcher).await;
        assert!(matches!(tick, VpdTick::Fallback { fan_on: Some(true), .. }));
        assert_eq!(harness.actuator.commands().len(), 1);
    }
}
