#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalyserError {
    #[error("VPD band bounds must be finite and non-negative")]
    NonFiniteBand,

    #[error("VPD band minimum {min} is above maximum {max}")]
    InvertedBand { min: f64, max: f64 },

    #[error("VPD optimum {optimal} lies outside [{min}, {max}]")]
    OptimumOutsideBand { min: f64, max: f64, optimal: f64 },
}
