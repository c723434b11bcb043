use std::collections::HashMap;
use std::path::PathBuf;
use std::{fmt, fs};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config;

/// City used until the user searches or geolocation succeeds.
pub const DEFAULT_CITY: &str = "Moscow";

/// The single key the settings record is persisted under. Bump the suffix
/// when the record shape changes incompatibly.
pub const SETTINGS_KEY: &str = "skycast-state-v1";

/// Measurement unit preference, passed through to the weather proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Units {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            _ => Err(anyhow::anyhow!(
                "Unknown unit system '{value}'. Supported values: metric, imperial."
            )),
        }
    }
}

/// Clock format preference. Serialized as the strings `"12"` / `"24"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TimeFormat {
    #[serde(rename = "12")]
    H12,
    #[default]
    #[serde(rename = "24")]
    H24,
}

impl TimeFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeFormat::H12 => "12",
            TimeFormat::H24 => "24",
        }
    }
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TimeFormat {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "12" => Ok(TimeFormat::H12),
            "24" => Ok(TimeFormat::H24),
            _ => Err(anyhow::anyhow!(
                "Unknown time format '{value}'. Supported values: 12, 24."
            )),
        }
    }
}

/// Persisted user state. Field names on the wire match the historical
/// camelCase record so existing state files keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub current_city: String,
    pub units: Units,
    pub time_format: TimeFormat,
    pub last_update_timestamp: Option<i64>,
    pub current_lat: Option<f64>,
    pub current_lon: Option<f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            current_city: DEFAULT_CITY.to_string(),
            units: Units::default(),
            time_format: TimeFormat::default(),
            last_update_timestamp: None,
            current_lat: None,
            current_lon: None,
        }
    }
}

impl Settings {
    /// Merge a persisted JSON document over the defaults, field by field.
    ///
    /// An unparseable document yields pure defaults; an individual field that
    /// is absent or outside its enumeration keeps its default while the rest
    /// of the record is still honored.
    pub fn merged_from_json(raw: &str) -> Self {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("stored settings are not valid JSON, using defaults: {e}");
                return Self::default();
            }
        };

        let mut settings = Self::default();
        if let Some(city) = value.get("currentCity").and_then(Value::as_str) {
            if !city.trim().is_empty() {
                settings.current_city = city.to_string();
            }
        }
        settings.units = field_or_default(&value, "units");
        settings.time_format = field_or_default(&value, "timeFormat");
        settings.last_update_timestamp = value.get("lastUpdateTimestamp").and_then(Value::as_i64);
        settings.current_lat = value.get("currentLat").and_then(Value::as_f64);
        settings.current_lon = value.get("currentLon").and_then(Value::as_f64);
        settings
    }
}

fn field_or_default<T: DeserializeOwned + Default>(value: &Value, key: &str) -> T {
    value
        .get(key)
        .cloned()
        .and_then(|field| serde_json::from_value(field).ok())
        .unwrap_or_default()
}

/// Durable key-value capability the settings record lives in: one
/// string-valued key, whole-record reads and writes.
pub trait SettingsStorage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// File-per-key storage under a directory, the durable backend for the CLI.
#[derive(Debug)]
pub struct FileSettingsStorage {
    dir: PathBuf,
}

impl FileSettingsStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Storage rooted at the platform data directory.
    pub fn at_platform_dir() -> Result<Self> {
        let dirs = config::project_dirs()?;
        Ok(Self::new(dirs.data_dir().to_path_buf()))
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl SettingsStorage for FileSettingsStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Ok(Some(contents))
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create settings directory: {}", self.dir.display())
        })?;
        let path = self.key_path(key);
        fs::write(&path, value)
            .with_context(|| format!("Failed to write settings file: {}", path.display()))?;
        Ok(())
    }
}

/// In-memory storage for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Load/save front for the settings record over an injected storage
/// capability. Saves are write-through and non-fatal: a failed write is
/// logged and the in-memory state stays authoritative.
pub struct SettingsStore {
    storage: Box<dyn SettingsStorage>,
}

impl SettingsStore {
    pub fn new(storage: Box<dyn SettingsStorage>) -> Self {
        Self { storage }
    }

    pub fn load(&self) -> Settings {
        match self.storage.read(SETTINGS_KEY) {
            Ok(Some(raw)) => Settings::merged_from_json(&raw),
            Ok(None) => Settings::default(),
            Err(e) => {
                tracing::warn!("failed to load settings, using defaults: {e:#}");
                Settings::default()
            }
        }
    }

    pub fn save(&self, settings: &Settings) {
        let raw = match serde_json::to_string(settings) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("failed to serialize settings: {e}");
                return;
            }
        };
        if let Err(e) = self.storage.write(SETTINGS_KEY, &raw) {
            tracing::warn!("failed to persist settings: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_stored() {
        let store = SettingsStore::new(Box::new(MemoryStorage::new()));
        assert_eq!(store.load(), Settings::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = SettingsStore::new(Box::new(MemoryStorage::new()));
        let settings = Settings {
            current_city: "Bergen".to_string(),
            units: Units::Imperial,
            time_format: TimeFormat::H12,
            last_update_timestamp: Some(1_700_000_000_000),
            current_lat: Some(60.39),
            current_lon: Some(5.32),
        };
        store.save(&settings);
        assert_eq!(store.load(), settings);
    }

    #[test]
    fn invalid_enum_fields_fall_back_individually() {
        let raw = r#"{
            "currentCity": "Oslo",
            "units": "furlongs",
            "timeFormat": "12",
            "currentLat": 59.91
        }"#;
        let settings = Settings::merged_from_json(raw);
        assert_eq!(settings.current_city, "Oslo");
        assert_eq!(settings.units, Units::Metric);
        assert_eq!(settings.time_format, TimeFormat::H12);
        assert_eq!(settings.current_lat, Some(59.91));
        assert_eq!(settings.current_lon, None);
    }

    #[test]
    fn garbage_document_yields_defaults() {
        assert_eq!(Settings::merged_from_json("not json at all"), Settings::default());
        assert_eq!(Settings::merged_from_json("[1,2,3]"), Settings::default());
    }

    #[test]
    fn blank_city_keeps_default() {
        let settings = Settings::merged_from_json(r#"{"currentCity": "   "}"#);
        assert_eq!(settings.current_city, DEFAULT_CITY);
    }

    #[test]
    fn file_storage_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileSettingsStorage::new(dir.path().join("state"));
        assert_eq!(storage.read(SETTINGS_KEY).expect("read"), None);
        storage.write(SETTINGS_KEY, r#"{"units":"imperial"}"#).expect("write");
        let raw = storage.read(SETTINGS_KEY).expect("read").expect("present");
        assert_eq!(Settings::merged_from_json(&raw).units, Units::Imperial);
    }

    #[test]
    fn unit_strings_round_trip() {
        assert_eq!(Units::try_from("metric").expect("parse"), Units::Metric);
        assert_eq!(Units::try_from("IMPERIAL").expect("parse"), Units::Imperial);
        assert!(Units::try_from("kelvin").is_err());
        assert_eq!(TimeFormat::try_from("12").expect("parse"), TimeFormat::H12);
        assert!(TimeFormat::try_from("25").is_err());
    }
}
