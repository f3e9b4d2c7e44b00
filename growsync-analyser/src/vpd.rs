use serde::{Deserialize, Serialize};

use crate::error::AnalyserError;

/// Saturation vapour pressure in kPa at `temp_c`, Tetens approximation.
pub fn saturation_vapor_pressure(temp_c: f64) -> f64 {
    0.6108 * (17.27 * temp_c / (temp_c + 237.3)).exp()
}

/// Vapour pressure deficit in kPa.
///
/// Returns `None` when a reading is absent or unusable (non-finite, negative,
/// humidity above 100). Zero is a legitimate reading for both inputs.
pub fn calculate_vpd(temp_c: Option<f64>, relative_humidity: Option<f64>) -> Option<f64> {
    let temp_c = temp_c.filter(|t| t.is_finite() && *t >= 0.0)?;
    let rh = relative_humidity.filter(|h| h.is_finite() && (0.0..=100.0).contains(h))?;

    let vpd = saturation_vapor_pressure(temp_c) * (1.0 - rh / 100.0);

    Some(vpd.max(0.0))
}

/// Target VPD range with an optimum the controller steers towards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VpdBand {
    pub min: f64,
    pub max: f64,
    pub optimal: f64,
}

impl VpdBand {
    /// Band whose optimum is the midpoint of `min` and `max`.
    pub fn new(min: f64, max: f64) -> Result<Self, AnalyserError> {
        Self::with_optimal(min, max, (min + max) / 2.0)
    }

    pub fn with_optimal(min: f64, max: f64, optimal: f64) -> Result<Self, AnalyserError> {
        let band = Self { min, max, optimal };
        band.validate()?;
        Ok(band)
    }

    pub fn validate(&self) -> Result<(), AnalyserError> {
        if ![self.min, self.max, self.optimal].iter().all(|v| v.is_finite() && *v >= 0.0) {
            return Err(AnalyserError::NonFiniteBand);
        }
        if self.min > self.max {
            return Err(AnalyserError::InvertedBand { min: self.min, max: self.max });
        }
        if self.optimal < self.min || self.optimal > self.max {
            return Err(AnalyserError::OptimumOutsideBand {
                min: self.min,
                max: self.max,
                optimal: self.optimal,
            });
        }
        Ok(())
    }

    pub fn contains(&self, vpd: f64) -> bool {
        vpd >= self.min && vpd <= self.max
    }

    /// Absolute distance of `vpd` from the optimum.
    pub fn deviation(&self, vpd: f64) -> f64 {
        (vpd - self.optimal).abs()
    }
}
