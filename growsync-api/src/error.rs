use growsync_analyser::AnalyserError;

use crate::models::Id;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("rule name must not be empty")]
    EmptyRuleName,

    #[error("rule priority {0} is above 100")]
    PriorityOutOfRange(u8),

    #[error("condition references an empty sensor name")]
    EmptySensorName,

    #[error("unknown sensor field `{0}`")]
    UnknownSensor(String),

    #[error("`between` on `{sensor}` requires value_max >= value")]
    InvalidRange { sensor: String },

    #[error("`{0}` is not a valid HH:MM time")]
    InvalidTimeOfDay(String),

    #[error("schedule condition needs at least one day")]
    EmptySchedule,

    #[error("action on device `{0}` has an empty command")]
    EmptyCommand(String),

    #[error("rule {0} cannot reference itself")]
    SelfReference(Id),

    #[error("invalid VPD band: {0}")]
    Band(#[from] AnalyserError),

    #[error("fan limits {min}..{max} are not a valid percentage range")]
    FanLimits { min: u8, max: u8 },

    #[error("light schedule hour {0} is outside 0..24")]
    LightHour(u8),

    #[error("watering group `{pump}` references soil slot {slot}; slots are 1-based")]
    SoilSlot { pump: String, slot: usize },

    #[error("invalid configuration: {0}")]
    Config(String),
}
