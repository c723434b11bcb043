//! Core library for the `skycast` weather client.
//!
//! This crate defines:
//! - Application configuration & persistent user settings
//! - The proxy gateway client and its error taxonomy
//! - Location resolution, advisory derivation, and the search orchestrator
//! - The offline cache router
//!
//! It is used by `skycast-cli`, but can also be reused by other binaries or services.

pub mod advisory;
pub mod config;
pub mod error;
pub mod gateway;
pub mod location;
pub mod model;
pub mod orchestrator;
pub mod router;
pub mod settings;

pub use advisory::{AdvisoryStore, Conditions, MAX_TIPS, Season};
pub use config::{AppConfig, FixedCoordinates, OfflineConfig};
pub use error::{GatewayError, LocationError};
pub use gateway::GatewayClient;
pub use location::{FixedGeolocator, Geolocator};
pub use model::{GeoResult, WeatherBundle};
pub use orchestrator::{EventSink, Phase, SearchOrchestrator};
pub use router::{CacheRouter, CacheStore, DiskCacheStore, HttpFetcher, ResourceRequest, RouterConfig};
pub use settings::{FileSettingsStorage, Settings, SettingsStore, TimeFormat, Units};
