use std::env;
use std::error::Error;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logger {
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub clean_start: bool,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gateway {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Samples arrive on `{prefix}/sensors`, commands leave on `{prefix}/commands`
    pub topic_prefix: String,
    pub auth: Option<GatewayAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notifier {
    pub webhook_url: String,
    #[serde(default = "Notifier::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Notifier {
    fn default_timeout_ms() -> u64 {
        5000
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Engine {
    /// Start the rule scheduler at boot
    pub autostart: bool,
    pub rule_tick_seconds: u64,
    pub dispatch_timeout_ms: u64,
    pub persistence_timeout_ms: u64,
    pub sample_queue_capacity: usize,
    pub alert_queue_capacity: usize,
    /// Nesting allowed for rule -> trigger -> rule chains
    pub max_trigger_depth: u8,
    /// Longest delay action honoured
    pub max_delay_seconds: u64,
    /// Offset applied to UTC for time-of-day logic
    pub utc_offset_hours: i8,
    /// Native PWM resolution of the actuator board
    pub pwm_native_max: u16,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            autostart: true,
            rule_tick_seconds: 5,
            dispatch_timeout_ms: 2000,
            persistence_timeout_ms: 2000,
            sample_queue_capacity: 64,
            alert_queue_capacity: 128,
            max_trigger_depth: 1,
            max_delay_seconds: 300,
            utc_offset_hours: 0,
            pwm_native_max: 255,
        }
    }
}

impl Engine {
    pub fn rule_tick(&self) -> Duration {
        Duration::from_secs(self.rule_tick_seconds.max(1))
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_millis(self.persistence_timeout_ms)
    }
}

/// Device names the built-in controllers address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Actuators {
    pub light: String,
    pub pump_1: String,
    pub pump_2: String,
    pub fan_intake: String,
    pub fan_exhaust: String,
    pub humidifier: String,
    pub dehumidifier: String,
    /// Fan the VPD controller drives
    pub vpd_fan: String,
}

impl Default for Actuators {
    fn default() -> Self {
        Self {
            light: "light".into(),
            pump_1: "pump_1".into(),
            pump_2: "pump_2".into(),
            fan_intake: "fan_intake".into(),
            fan_exhaust: "fan_exhaust".into(),
            humidifier: "humidifier".into(),
            dehumidifier: "dehumidifier".into(),
            vpd_fan: "fan_exhaust".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub logger: Logger,
    pub database: Database,
    pub gateway: Option<Gateway>,
    pub notifier: Option<Notifier>,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub actuators: Actuators,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or("development".into());

        Config::builder()
            .add_source(File::with_name("configs/default"))
            .add_source(File::with_name(&format!("configs/{run_mode}")).required(false))
            .add_source(Environment::with_prefix("GROWSYNC").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Overlays the non-null top-level fields of `right` onto `left`.
    pub fn merge<L, R, T>(left: L, right: R) -> Result<T, Box<dyn Error + Send + Sync>>
    where
        L: Serialize,
        R: Serialize,
        T: Serialize + DeserializeOwned,
    {
        let mut left_map = serde_json::to_value(&left)?
            .as_object()
            .map(|map| map.to_owned())
            .ok_or("Failed to serialize left value which is not an object")?;

        let mut right_map = serde_json::to_value(&right)?
            .as_object()
            .map(|map| map.to_owned())
            .ok_or("Failed to serialize right value which is not an object")?;

        right_map.retain(|_, v| !v.is_null());
        left_map.extend(right_map);

        let value = serde_json::to_value(&left_map)?;

        Ok(serde_json::from_value(value)?)
    }
}
