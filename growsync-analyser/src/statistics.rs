use serde::{Deserialize, Serialize};

/// Running VPD statistics kept alongside the controller state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VpdStatistics {
    pub adjustments: u64,
    pub average_vpd: f64,
    pub time_in_optimal_seconds: f64,
}

impl VpdStatistics {
    /// Folds one fan adjustment into the statistics. `elapsed_seconds` is the
    /// time since the previous reading and only counts towards time-in-range
    /// when the reading sat inside the target band.
    pub fn record(&mut self, vpd: f64, elapsed_seconds: f64, in_optimal_range: bool) {
        self.adjustments += 1;
        // incremental mean: m_n = m_{n-1} + (x - m_{n-1}) / n
        self.average_vpd += (vpd - self.average_vpd) / self.adjustments as f64;

        if in_optimal_range && elapsed_seconds.is_finite() && elapsed_seconds > 0.0 {
            self.time_in_optimal_seconds += elapsed_seconds;
        }
    }
}
