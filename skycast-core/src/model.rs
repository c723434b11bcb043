use serde::{Deserialize, Serialize};

/// A resolved place: coordinates plus a display name.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoResult {
    pub lat: f64,
    pub lon: f64,
    pub name: String,
}

impl GeoResult {
    /// Fixed-precision coordinate string used whenever a friendly name could
    /// not be obtained.
    pub fn synthesized_name(lat: f64, lon: f64) -> String {
        format!("{lat:.2}, {lon:.2}")
    }
}

/// One descriptor from the upstream `weather` array (description + icon code).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionTag {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

/// Conditions at the observation time. Everything beyond `dt` is optional:
/// the proxy passes the upstream payload through unmodified and partial
/// payloads must not fail the whole lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub dt: i64,
    #[serde(default)]
    pub temp: Option<f64>,
    #[serde(default)]
    pub feels_like: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub visibility: Option<f64>,
    #[serde(default)]
    pub uvi: Option<f64>,
    #[serde(default)]
    pub sunrise: Option<i64>,
    #[serde(default)]
    pub sunset: Option<i64>,
    #[serde(default)]
    pub weather: Vec<ConditionTag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyEntry {
    pub dt: i64,
    #[serde(default)]
    pub temp: Option<f64>,
    #[serde(default)]
    pub pop: Option<f64>,
    #[serde(default)]
    pub weather: Vec<ConditionTag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyTemp {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub day: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyEntry {
    pub dt: i64,
    #[serde(default)]
    pub temp: DailyTemp,
    #[serde(default)]
    pub pop: Option<f64>,
    #[serde(default)]
    pub sunrise: Option<i64>,
    #[serde(default)]
    pub sunset: Option<i64>,
    #[serde(default)]
    pub weather: Vec<ConditionTag>,
}

/// One weather lookup result.
///
/// `current`, `hourly`, and `daily` are required: a payload missing any of
/// them fails deserialization and is rejected as malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherBundle {
    pub current: CurrentConditions,
    pub hourly: Vec<HourlyEntry>,
    pub daily: Vec<DailyEntry>,
    /// Offset from UTC in seconds for the bundle's location.
    #[serde(default)]
    pub timezone_offset: i64,
}
