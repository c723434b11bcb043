use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::error::LocationError;
use crate::gateway::GatewayClient;
use crate::model::GeoResult;

/// Bounded wait for a position fix.
pub const GEOLOCATION_TIMEOUT: Duration = Duration::from_secs(10);

/// A cached fix no older than this may be returned instead of a fresh one.
pub const MAX_POSITION_AGE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Platform geolocation capability.
#[async_trait]
pub trait Geolocator: Send + Sync {
    /// Acquire the current position. Implementations may serve a cached fix
    /// up to `max_age` old.
    async fn current_position(&self, max_age: Duration) -> Result<Coordinates, LocationError>;
}

/// Fixed coordinates from configuration; stands in for platform geolocation
/// on hosts without one.
#[derive(Debug, Clone)]
pub struct FixedGeolocator {
    coordinates: Coordinates,
}

impl FixedGeolocator {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            coordinates: Coordinates { lat, lon },
        }
    }
}

#[async_trait]
impl Geolocator for FixedGeolocator {
    async fn current_position(&self, _max_age: Duration) -> Result<Coordinates, LocationError> {
        Ok(self.coordinates)
    }
}

/// Resolve the user's location to coordinates plus a display name.
///
/// Geolocation failures are terminal for the call; a reverse-geocoding
/// failure is not. Once coordinates are acquired the resolution always
/// succeeds, substituting a synthesized coordinate string when no friendly
/// name could be obtained.
pub async fn resolve_user_location(
    geolocator: Option<&dyn Geolocator>,
    gateway: &GatewayClient,
) -> Result<GeoResult, LocationError> {
    resolve_user_location_within(geolocator, gateway, GEOLOCATION_TIMEOUT).await
}

/// [`resolve_user_location`] with an explicit bound on the position wait.
pub async fn resolve_user_location_within(
    geolocator: Option<&dyn Geolocator>,
    gateway: &GatewayClient,
    wait: Duration,
) -> Result<GeoResult, LocationError> {
    let Some(geolocator) = geolocator else {
        return Err(LocationError::Unsupported);
    };

    let position = match timeout(wait, geolocator.current_position(MAX_POSITION_AGE)).await {
        Ok(result) => result?,
        Err(_) => return Err(LocationError::Timeout),
    };
    tracing::info!(lat = position.lat, lon = position.lon, "position acquired");

    let name = match gateway.reverse_geocode(position.lat, position.lon).await {
        Ok(name) => name,
        Err(e) => {
            tracing::warn!("reverse geocoding failed, using raw coordinates: {e}");
            GeoResult::synthesized_name(position.lat, position.lon)
        }
    };

    Ok(GeoResult {
        lat: position.lat,
        lon: position.lon,
        name,
    })
}
