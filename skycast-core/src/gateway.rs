//! HTTP client for the weather proxy.
//!
//! Wraps `reqwest` with the uniform response classification every endpoint
//! shares: 2xx JSON parses, everything else maps to a typed
//! [`GatewayError`] kind, with endpoint-specific wording for 404s.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;

use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::model::{GeoResult, WeatherBundle};
use crate::settings::Units;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "skycast/0.1";

/// Which proxy endpoint a response came from; drives the 404 wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Geocode,
    ReverseGeocode,
    Weather,
}

impl Endpoint {
    fn context(self) -> &'static str {
        match self {
            Endpoint::Geocode => "geocoding",
            Endpoint::ReverseGeocode => "reverse geocoding",
            Endpoint::Weather => "weather lookup",
        }
    }

    fn not_found_message(self) -> String {
        match self {
            Endpoint::Geocode => "city not found".to_string(),
            Endpoint::ReverseGeocode => "could not determine the city".to_string(),
            Endpoint::Weather => "requested resource was not found (404)".to_string(),
        }
    }
}

/// Client for the caller-operated weather proxy.
///
/// Use [`GatewayClient::new`] in production or
/// [`GatewayClient::with_base_url`] to point at a mock server in tests.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: Url,
    lang: String,
}

impl GatewayClient {
    pub fn new(config: &AppConfig) -> Result<Self, GatewayError> {
        Self::with_base_url(&config.proxy_base_url, &config.lang)
    }

    pub fn with_base_url(base_url: &str, lang: &str) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        // Normalise: the base must end with exactly one slash so joining an
        // endpoint name appends a path segment instead of replacing one.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let parsed = Url::parse(&normalised).map_err(|e| GatewayError::Generic {
            context: "configuration",
            message: format!("invalid proxy base URL '{base_url}': {e}"),
        })?;

        Ok(Self {
            http,
            base_url: parsed,
            lang: lang.to_owned(),
        })
    }

    /// Resolve a city name to coordinates plus a display name.
    ///
    /// The proxy answers with a JSON array; an empty array means the city
    /// does not exist and maps to [`GatewayError::NotFound`].
    pub async fn geocode(&self, city: &str) -> Result<GeoResult, GatewayError> {
        let url = self.endpoint_url("geocode", &[("city", city)])?;
        tracing::debug!(%url, "geocode request");
        let body = self.request(Endpoint::Geocode, url).await?;

        let entries: Vec<GeoEntry> = serde_json::from_value(body)
            .map_err(|e| GatewayError::UnexpectedFormat(format!("geocode payload: {e}")))?;
        let Some(entry) = entries.into_iter().next() else {
            return Err(GatewayError::NotFound(format!("city \"{city}\" was not found")));
        };

        let name = entry
            .place
            .best_name(&self.lang)
            .unwrap_or_else(|| GeoResult::synthesized_name(entry.lat, entry.lon));
        tracing::info!(city, %name, lat = entry.lat, lon = entry.lon, "geocoded");
        Ok(GeoResult {
            lat: entry.lat,
            lon: entry.lon,
            name,
        })
    }

    /// Resolve coordinates to a display name.
    pub async fn reverse_geocode(&self, lat: f64, lon: f64) -> Result<String, GatewayError> {
        let url = self.endpoint_url(
            "reverse-geocode",
            &[("lat", &lat.to_string()), ("lon", &lon.to_string())],
        )?;
        tracing::debug!(%url, "reverse geocode request");
        let body = self.request(Endpoint::ReverseGeocode, url).await?;

        let entries: Vec<PlaceName> = serde_json::from_value(body)
            .map_err(|e| GatewayError::UnexpectedFormat(format!("reverse geocode payload: {e}")))?;
        entries
            .into_iter()
            .next()
            .and_then(|place| place.best_name(&self.lang))
            .ok_or_else(|| {
                GatewayError::NotFound("could not determine the city for these coordinates".into())
            })
    }

    /// Fetch the current/hourly/daily weather bundle for a coordinate pair.
    pub async fn fetch_weather(
        &self,
        lat: f64,
        lon: f64,
        units: Units,
    ) -> Result<WeatherBundle, GatewayError> {
        let url = self.endpoint_url(
            "weather",
            &[
                ("lat", &lat.to_string()),
                ("lon", &lon.to_string()),
                ("units", units.as_str()),
                ("lang", &self.lang),
            ],
        )?;
        tracing::debug!(%url, "weather request");
        let body = self.request(Endpoint::Weather, url).await?;

        serde_json::from_value(body)
            .map_err(|e| GatewayError::UnexpectedFormat(format!("weather payload: {e}")))
    }

    fn endpoint_url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.join(path).map_err(|e| GatewayError::Generic {
            context: "configuration",
            message: format!("cannot build endpoint URL for '{path}': {e}"),
        })?;
        for (key, value) in params {
            url.query_pairs_mut().append_pair(key, value);
        }
        Ok(url)
    }

    async fn request(&self, endpoint: Endpoint, url: Url) -> Result<Value, GatewayError> {
        let response = self.http.get(url).send().await?;
        classify_response(endpoint, response).await
    }
}

#[derive(Debug, Deserialize)]
struct PlaceName {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    local_names: Option<HashMap<String, String>>,
}

impl PlaceName {
    /// Localized name for the configured language, then the generic name.
    fn best_name(&self, lang: &str) -> Option<String> {
        self.local_names
            .as_ref()
            .and_then(|names| names.get(lang))
            .cloned()
            .or_else(|| self.name.clone())
            .filter(|name| !name.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct GeoEntry {
    lat: f64,
    lon: f64,
    #[serde(flatten)]
    place: PlaceName,
}

async fn classify_response(
    endpoint: Endpoint,
    response: Response,
) -> Result<Value, GatewayError> {
    let status = response.status();

    if status.is_success() {
        let is_json = content_type_is_json(&response);
        let text = response.text().await?;
        if !is_json {
            tracing::warn!(%status, context = endpoint.context(), "non-JSON success response");
            return Err(GatewayError::UnexpectedFormat(format!(
                "expected JSON from the {} endpoint, got status {status} with a non-JSON body",
                endpoint.context()
            )));
        }
        return serde_json::from_str(&text).map_err(|e| {
            GatewayError::UnexpectedFormat(format!(
                "invalid JSON from the {} endpoint: {e}",
                endpoint.context()
            ))
        });
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(%status, context = endpoint.context(), "proxy returned an error status");

    match status {
        StatusCode::NOT_FOUND => Err(GatewayError::NotFound(endpoint.not_found_message())),
        StatusCode::UNAUTHORIZED => Err(GatewayError::AuthFailure),
        StatusCode::TOO_MANY_REQUESTS => Err(GatewayError::RateLimited),
        s if s.is_server_error() => Err(GatewayError::UpstreamUnavailable {
            status: s.as_u16(),
        }),
        s => Err(GatewayError::Generic {
            context: endpoint.context(),
            message: upstream_message(&body, s),
        }),
    }
}

fn content_type_is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"))
}

/// The upstream `{message}` field when the body is JSON, else the raw text.
fn upstream_message(body: &str, status: StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    if body.trim().is_empty() {
        format!("HTTP error {status}")
    } else {
        truncate_body(body)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        let truncated: String = body.chars().take(MAX).collect();
        format!("{truncated}...")
    } else {
        body.to_string()
    }
}
