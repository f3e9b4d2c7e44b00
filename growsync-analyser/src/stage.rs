use serde::{Deserialize, Serialize};

use crate::vpd::VpdBand;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Seedling,
    #[default]
    Vegetative,
    Flowering,
    LateFlowering,
}

impl GrowthStage {
    pub fn target_band(self) -> VpdBand {
        let (min, max, optimal) = match self {
            GrowthStage::Seedling => (0.4, 0.8, 0.6),
            GrowthStage::Vegetative => (0.8, 1.2, 1.0),
            GrowthStage::Flowering => (1.0, 1.5, 1.25),
            GrowthStage::LateFlowering => (1.2, 1.6, 1.4),
        };
        VpdBand { min, max, optimal }
    }

    /// Hours of light per day.
    pub fn photoperiod_hours(self) -> u8 {
        match self {
            GrowthStage::Seedling | GrowthStage::Vegetative => 18,
            GrowthStage::Flowering | GrowthStage::LateFlowering => 12,
        }
    }
}
