//! Advisory tips derived from current conditions.
//!
//! A remote JSON rule table maps temperature bands, humidity bands, and
//! seasons to tip lists. The table is loaded once per process (single-flight)
//! with one local fallback; if both locations fail, advisories stay disabled
//! until restart rather than retrying on every call.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use chrono::{Datelike, Local};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::config::AppConfig;
use crate::model::CurrentConditions;

/// At most this many tips are surfaced per derivation.
pub const MAX_TIPS: usize = 5;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    /// Meteorological seasons by calendar month (1-12).
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }

    pub fn current() -> Self {
        Self::from_month(Local::now().month())
    }

    pub fn key(self) -> &'static str {
        match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::Winter => "winter",
        }
    }
}

/// One threshold band: applies when the datum is >= `min` (a band with no
/// `min` only matches as the catch-all lowest tier).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Band {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub tips: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemperatureBands {
    #[serde(default)]
    pub hot: Option<Band>,
    #[serde(default)]
    pub moderate: Option<Band>,
    #[serde(default)]
    pub cold: Option<Band>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HumidityBands {
    #[serde(default)]
    pub high: Option<Band>,
    #[serde(default)]
    pub normal: Option<Band>,
    #[serde(default)]
    pub low: Option<Band>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeasonTips {
    #[serde(default)]
    pub tips: Vec<String>,
}

/// The loaded rule table. Every section is optional: a partial table
/// degrades the matching steps, it never aborts a derivation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleTable {
    #[serde(default)]
    pub temperature: Option<TemperatureBands>,
    #[serde(default)]
    pub humidity: Option<HumidityBands>,
    #[serde(default)]
    pub seasons: Option<HashMap<String, SeasonTips>>,
}

/// The weather datums the deriver looks at. A missing datum skips its band
/// step without failing the call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Conditions {
    pub temp: Option<f64>,
    pub humidity: Option<f64>,
}

impl From<&CurrentConditions> for Conditions {
    fn from(current: &CurrentConditions) -> Self {
        Self {
            temp: current.temp,
            humidity: current.humidity,
        }
    }
}

/// Derive the advisory list for the given conditions and season.
///
/// Output is deterministic: tips are collected in first-seen order,
/// deduplicated, and truncated to [`MAX_TIPS`].
pub fn derive_tips(table: &RuleTable, conditions: Conditions, season: Season) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    if let (Some(temp), Some(bands)) = (conditions.temp, table.temperature.as_ref()) {
        if let Some(band) =
            select_band(temp, bands.hot.as_ref(), bands.moderate.as_ref(), bands.cold.as_ref())
        {
            extend_dedup(&mut out, &band.tips);
        }
    }

    if let (Some(humidity), Some(bands)) = (conditions.humidity, table.humidity.as_ref()) {
        if let Some(band) =
            select_band(humidity, bands.high.as_ref(), bands.normal.as_ref(), bands.low.as_ref())
        {
            extend_dedup(&mut out, &band.tips);
        }
    }

    if let Some(seasons) = table.seasons.as_ref() {
        if let Some(entry) = seasons.get(season.key()) {
            extend_dedup(&mut out, &entry.tips);
        } else {
            tracing::debug!(season = season.key(), "no tips for this season");
        }
    }

    out.truncate(MAX_TIPS);
    out
}

/// Three-tier threshold selection: upper band if the value reaches its
/// `min`, else the middle band, else the lowest band as catch-all.
fn select_band<'a>(
    value: f64,
    upper: Option<&'a Band>,
    middle: Option<&'a Band>,
    lowest: Option<&'a Band>,
) -> Option<&'a Band> {
    if let Some(band) = upper {
        if band.min.is_some_and(|min| value >= min) {
            return Some(band);
        }
    }
    if let Some(band) = middle {
        if band.min.is_some_and(|min| value >= min) {
            return Some(band);
        }
    }
    lowest
}

fn extend_dedup(out: &mut Vec<String>, tips: &[String]) {
    for tip in tips {
        if !out.iter().any(|seen| seen == tip) {
            out.push(tip.clone());
        }
    }
}

/// Loads and caches the rule table, then answers derivation requests.
///
/// The load is single-flight: concurrent callers all await the one
/// outstanding attempt, and the outcome (including "both locations failed")
/// is cached for the life of the process.
pub struct AdvisoryStore {
    http: Client,
    url: Option<String>,
    fallback_path: Option<PathBuf>,
    table: OnceCell<Option<RuleTable>>,
}

impl AdvisoryStore {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_sources(config.advisory_url.clone(), config.advisory_fallback_path.clone())
    }

    pub fn with_sources(url: Option<String>, fallback_path: Option<PathBuf>) -> Self {
        Self {
            http: Client::new(),
            url,
            fallback_path,
            table: OnceCell::new(),
        }
    }

    /// Kick off the load ahead of the first derivation request.
    pub async fn prewarm(&self) {
        let _ = self.table().await;
    }

    /// Advisories for the given conditions and the season of the current
    /// month. Never errors: an unavailable table yields an empty list.
    pub async fn advisories(&self, conditions: Conditions) -> Vec<String> {
        self.advisories_for_season(conditions, Season::current()).await
    }

    pub async fn advisories_for_season(
        &self,
        conditions: Conditions,
        season: Season,
    ) -> Vec<String> {
        match self.table().await {
            Some(table) => derive_tips(table, conditions, season),
            None => Vec::new(),
        }
    }

    async fn table(&self) -> Option<&RuleTable> {
        self.table
            .get_or_init(|| async { self.load().await })
            .await
            .as_ref()
    }

    async fn load(&self) -> Option<RuleTable> {
        if let Some(url) = &self.url {
            match self.fetch_remote(url).await {
                Ok(table) => {
                    tracing::info!(%url, "advisory rule table loaded");
                    return Some(table);
                }
                Err(e) => tracing::warn!(%url, "primary advisory load failed: {e:#}"),
            }
        }

        if let Some(path) = &self.fallback_path {
            match load_local(path) {
                Ok(table) => {
                    tracing::info!(path = %path.display(), "advisory rule table loaded from fallback");
                    return Some(table);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "fallback advisory load failed: {e:#}");
                }
            }
        }

        tracing::warn!("advisory rule table unavailable, advisories disabled for this run");
        None
    }

    async fn fetch_remote(&self, url: &str) -> anyhow::Result<RuleTable> {
        let response = self
            .http
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await
            .with_context(|| format!("Failed to request advisory table from {url}"))?;
        if !response.status().is_success() {
            anyhow::bail!("HTTP {} from {url}", response.status());
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse advisory table from {url}"))
    }
}

fn load_local(path: &std::path::Path) -> anyhow::Result<RuleTable> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read advisory table: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse advisory table: {}", path.display()))
}
