use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Short headline, usually the emitting component or rule name
    pub title: String,
    /// Human readable details
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    /// Time the alert was raised
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity, timestamp: OffsetDateTime) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            timestamp,
        }
    }
}
