use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

/// Proxy used when the user has not configured one yet. The proxy holds the
/// real third-party credential; this client never sees an API key.
pub const DEFAULT_PROXY_URL: &str = "http://127.0.0.1:8787/api";

/// Fixed coordinates standing in for a platform geolocation capability.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FixedCoordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Settings for the offline resource cache: which requests the router
/// intercepts and which assets get pre-populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Origin the application is served from.
    pub origin: String,
    /// Path prefix of the application under that origin.
    pub base_path: String,
    /// Path prefix of proxy API calls (never cached).
    pub api_prefix: String,
    /// Cache generation tag; bump to invalidate everything cached so far.
    pub cache_version: String,
    /// Third-party origins (e.g. a font host) cached cache-first.
    pub vendor_origins: Vec<String>,
    /// Same-origin assets pre-populated at install.
    pub core_assets: Vec<String>,
    /// Third-party assets pre-populated at install; individually optional.
    pub vendor_assets: Vec<String>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8080".to_string(),
            base_path: "/".to_string(),
            api_prefix: "/api/".to_string(),
            cache_version: "v1".to_string(),
            vendor_origins: Vec::new(),
            core_assets: Vec::new(),
            vendor_assets: Vec::new(),
        }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the weather proxy, e.g. "https://my-proxy.example.com/api".
    pub proxy_base_url: String,

    /// Language code sent to the proxy and preferred for localized names.
    pub lang: String,

    /// Primary location of the advisory rule table.
    pub advisory_url: Option<String>,

    /// Local fallback read when the primary location fails.
    pub advisory_fallback_path: Option<PathBuf>,

    /// Example TOML:
    /// [location]
    /// lat = 55.75
    /// lon = 37.61
    pub location: Option<FixedCoordinates>,

    pub offline: OfflineConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            proxy_base_url: DEFAULT_PROXY_URL.to_string(),
            lang: "en".to_string(),
            advisory_url: None,
            advisory_fallback_path: None,
            location: None,
            offline: OfflineConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load config from disk, or return the defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return defaults.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Platform directories shared by the config file, the settings record, and
/// the disk cache.
pub fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "skycast", "skycast")
        .ok_or_else(|| anyhow!("Could not determine platform config directory"))
}
