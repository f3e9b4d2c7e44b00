pub mod error;
pub mod fan_speed;
pub mod stage;
pub mod statistics;
pub mod vpd;

pub use error::AnalyserError;
pub use fan_speed::{next_fan_speed, Aggressiveness, FanProfile};
pub use stage::GrowthStage;
pub use statistics::VpdStatistics;
pub use vpd::{calculate_vpd, saturation_vapor_pressure, VpdBand};
