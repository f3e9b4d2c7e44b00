use serde::{Deserialize, Serialize};

use crate::vpd::VpdBand;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggressiveness {
    Gentle,
    #[default]
    Normal,
    Aggressive,
}

/// Step size and speed range used by one aggressiveness setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FanProfile {
    pub step: f64,
    pub min_speed: u8,
    pub max_speed: u8,
}

impl Aggressiveness {
    pub fn profile(self) -> FanProfile {
        match self {
            Aggressiveness::Gentle => FanProfile { step: 5.0, min_speed: 20, max_speed: 70 },
            Aggressiveness::Normal => FanProfile { step: 10.0, min_speed: 30, max_speed: 85 },
            Aggressiveness::Aggressive => FanProfile { step: 15.0, min_speed: 40, max_speed: 100 },
        }
    }
}

const EXTREME_ERROR: f64 = 0.4;
const LARGE_ERROR: f64 = 0.2;
const MODERATE_ERROR: f64 = 0.1;
const DEAD_ZONE: f64 = 0.05;

/// Next fan speed (percent) for a VPD reading.
///
/// High VPD (air too dry) speeds the fan up, low VPD slows it down. Inside
/// the dead zone the current speed is returned untouched; otherwise the
/// result is clamped into the profile's range.
pub fn next_fan_speed(
    current_vpd: f64,
    band: &VpdBand,
    current_speed: u8,
    aggressiveness: Aggressiveness,
) -> u8 {
    let profile = aggressiveness.profile();
    let error = current_vpd - band.optimal;
    let magnitude = error.abs();

    if magnitude < DEAD_ZONE || !error.is_finite() {
        return current_speed;
    }

    let current = f64::from(current_speed);
    let direction = error.signum();

    let target = if magnitude > EXTREME_ERROR {
        if error > 0.0 {
            f64::from(profile.max_speed)
        } else {
            f64::from(profile.min_speed)
        }
    } else if magnitude >= LARGE_ERROR {
        current + direction * profile.step * 2.0
    } else if magnitude >= MODERATE_ERROR {
        current + direction * profile.step
    } else {
        current + direction * profile.step / 2.0
    };

    target
        .clamp(f64::from(profile.min_speed), f64::from(profile.max_speed))
        .round() as u8
}
