use growsync_analyser::calculate_vpd;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Vertical position of a temperature/humidity sensor pair in the grow box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Bottom,
    Middle,
    Top,
}

impl Zone {
    pub const ALL: [Zone; 3] = [Zone::Bottom, Zone::Middle, Zone::Top];

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Bottom => "bottom",
            Zone::Middle => "middle",
            Zone::Top => "top",
        }
    }
}

/// One reading of every sensor in the box. Absent sensors are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    /// Air temperature near the floor in Celsius
    #[serde(default)]
    pub temp_bottom: Option<f64>,
    /// Air temperature at canopy height in Celsius
    #[serde(default)]
    pub temp_middle: Option<f64>,
    /// Air temperature under the light in Celsius
    #[serde(default)]
    pub temp_top: Option<f64>,
    /// Relative humidity near the floor in percent
    #[serde(default)]
    pub humidity_bottom: Option<f64>,
    /// Relative humidity at canopy height in percent
    #[serde(default)]
    pub humidity_middle: Option<f64>,
    /// Relative humidity under the light in percent
    #[serde(default)]
    pub humidity_top: Option<f64>,
    /// Soil moisture per plant slot in percent, slot 1 first
    #[serde(default)]
    pub soil_moisture: Vec<Option<f64>>,
    /// Light level in lux
    #[serde(default)]
    pub light: Option<f64>,
    /// Gas concentration in ppm
    #[serde(default)]
    pub gas: Option<f64>,
    /// Reservoir level in percent
    #[serde(default)]
    pub water_level: Option<f64>,
    /// Time the sample was taken
    #[serde(default = "OffsetDateTime::now_utc", with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Temperature and humidity readings only count when positive.
fn valid(reading: Option<f64>) -> Option<f64> {
    reading.filter(|v| v.is_finite() && *v > 0.0)
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

impl SensorSample {
    pub fn new(timestamp: OffsetDateTime) -> Self {
        Self {
            temp_bottom: None,
            temp_middle: None,
            temp_top: None,
            humidity_bottom: None,
            humidity_middle: None,
            humidity_top: None,
            soil_moisture: Vec::new(),
            light: None,
            gas: None,
            water_level: None,
            timestamp,
        }
    }

    pub fn temperature(&self, zone: Zone) -> Option<f64> {
        match zone {
            Zone::Bottom => self.temp_bottom,
            Zone::Middle => self.temp_middle,
            Zone::Top => self.temp_top,
        }
    }

    pub fn humidity(&self, zone: Zone) -> Option<f64> {
        match zone {
            Zone::Bottom => self.humidity_bottom,
            Zone::Middle => self.humidity_middle,
            Zone::Top => self.humidity_top,
        }
    }

    pub fn mean_temperature(&self) -> Option<f64> {
        mean(Zone::ALL.iter().filter_map(|z| valid(self.temperature(*z))))
    }

    pub fn mean_humidity(&self) -> Option<f64> {
        mean(Zone::ALL.iter().filter_map(|z| valid(self.humidity(*z))))
    }

    /// Hottest positive temperature reading across the zones.
    pub fn max_temperature(&self) -> Option<f64> {
        Zone::ALL
            .iter()
            .filter_map(|z| valid(self.temperature(*z)))
            .reduce(f64::max)
    }

    /// VPD from the mean temperature and mean humidity.
    pub fn vpd(&self) -> Option<f64> {
        calculate_vpd(self.mean_temperature(), self.mean_humidity())
    }

    pub fn zone_vpd(&self, zone: Zone) -> Option<f64> {
        calculate_vpd(valid(self.temperature(zone)), valid(self.humidity(zone)))
    }

    /// Soil moisture for a 1-based plant slot.
    pub fn soil_moisture_slot(&self, slot: usize) -> Option<f64> {
        slot.checked_sub(1)
            .and_then(|index| self.soil_moisture.get(index).copied().flatten())
            .filter(|v| v.is_finite() && *v >= 0.0)
    }

    pub fn mean_soil_moisture(&self) -> Option<f64> {
        mean((1..=self.soil_moisture.len()).filter_map(|slot| self.soil_moisture_slot(slot)))
    }

    /// Whether `name` belongs to the field vocabulary rule conditions may use.
    pub fn is_known_field(name: &str) -> bool {
        match name {
            "temp_bottom" | "temp_middle" | "temp_top" | "temperature" | "humidity_bottom"
            | "humidity_middle" | "humidity_top" | "humidity" | "vpd" | "light" | "gas"
            | "water_level" | "soil_moisture" => true,
            _ => name
                .strip_prefix("soil_moisture_")
                .and_then(|slot| slot.parse::<usize>().ok())
                .is_some_and(|slot| slot >= 1),
        }
    }

    /// Looks a reading up by its field name.
    pub fn field(&self, name: &str) -> Option<f64> {
        let reading = match name {
            "temp_bottom" => self.temp_bottom,
            "temp_middle" => self.temp_middle,
            "temp_top" => self.temp_top,
            "temperature" => self.mean_temperature(),
            "humidity_bottom" => self.humidity_bottom,
            "humidity_middle" => self.humidity_middle,
            "humidity_top" => self.humidity_top,
            "humidity" => self.mean_humidity(),
            "vpd" => self.vpd(),
            "light" => self.light,
            "gas" => self.gas,
            "water_level" => self.water_level,
            "soil_moisture" => self.mean_soil_moisture(),
            other => other
                .strip_prefix("soil_moisture_")
                .and_then(|slot| slot.parse::<usize>().ok())
                .and_then(|slot| self.soil_moisture_slot(slot)),
        };
        reading.filter(|v| v.is_finite())
    }
}
