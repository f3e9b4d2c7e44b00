use serde::{Deserialize, Serialize};
use time::Weekday;

use crate::error::ValidationError;
use crate::models::SensorSample;

/// How a condition's result combines with the next condition in the list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">=")]
    GreaterOrEqual,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "between")]
    Between,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<Weekday> for Day {
    fn from(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Monday => Day::Monday,
            Weekday::Tuesday => Day::Tuesday,
            Weekday::Wednesday => Day::Wednesday,
            Weekday::Thursday => Day::Thursday,
            Weekday::Friday => Day::Friday,
            Weekday::Saturday => Day::Saturday,
            Weekday::Sunday => Day::Sunday,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorCondition {
    /// Sensor field name, e.g. `temp_top` or `soil_moisture_2`
    pub sensor: String,
    /// Comparison applied to the reading
    pub operator: Comparison,
    /// Threshold, or lower bound for `between`
    pub value: f64,
    /// Upper bound for `between`
    #[serde(default)]
    pub value_max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive start, HH:MM local time
    pub start: String,
    /// Inclusive end, HH:MM local time
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Days on which the condition holds
    pub days: Vec<Day>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionKind {
    Sensor(SensorCondition),
    Time(TimeWindow),
    Schedule(Schedule),
    /// Reserved; always evaluates to false.
    Manual,
    /// Reserved; always evaluates to false.
    State,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(flatten)]
    pub kind: ConditionKind,
    /// Combinator with the next condition
    #[serde(default)]
    pub logic: Logic,
}

impl Comparison {
    pub fn holds(&self, reading: f64, value: f64, value_max: Option<f64>) -> bool {
        match self {
            Comparison::GreaterThan => reading > value,
            Comparison::LessThan => reading < value,
            Comparison::GreaterOrEqual => reading >= value,
            Comparison::LessOrEqual => reading <= value,
            Comparison::Equal => reading == value,
            Comparison::NotEqual => reading != value,
            Comparison::Between => value_max.is_some_and(|max| reading >= value && reading <= max),
        }
    }
}

/// Parses `HH:MM` into minutes after midnight.
pub fn parse_time_of_day(text: &str) -> Result<u16, ValidationError> {
    let invalid = || ValidationError::InvalidTimeOfDay(text.to_string());

    let (hours, minutes) = text.split_once(':').ok_or_else(invalid)?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(invalid());
    }

    let hours: u16 = hours.parse().map_err(|_| invalid())?;
    let minutes: u16 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    Ok(hours * 60 + minutes)
}

impl Condition {
    pub fn new(kind: ConditionKind) -> Self {
        Self { kind, logic: Logic::And }
    }

    pub fn sensor(sensor: &str, operator: Comparison, value: f64) -> Self {
        Self::new(ConditionKind::Sensor(SensorCondition {
            sensor: sensor.to_string(),
            operator,
            value,
            value_max: None,
        }))
    }

    pub fn with_logic(mut self, logic: Logic) -> Self {
        self.logic = logic;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.kind {
            ConditionKind::Sensor(condition) => {
                if condition.sensor.trim().is_empty() {
                    return Err(ValidationError::EmptySensorName);
                }
                if !SensorSample::is_known_field(&condition.sensor) {
                    return Err(ValidationError::UnknownSensor(condition.sensor.clone()));
                }
                if condition.operator == Comparison::Between
                    && !condition.value_max.is_some_and(|max| max >= condition.value)
                {
                    return Err(ValidationError::InvalidRange { sensor: condition.sensor.clone() });
                }
                Ok(())
            }
            ConditionKind::Time(window) => {
                parse_time_of_day(&window.start)?;
                parse_time_of_day(&window.end)?;
                Ok(())
            }
            ConditionKind::Schedule(schedule) if schedule.days.is_empty() => {
                Err(ValidationError::EmptySchedule)
            }
            ConditionKind::Schedule(_) | ConditionKind::Manual | ConditionKind::State => Ok(()),
        }
    }
}
