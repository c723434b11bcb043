use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use inquire::{Confirm, CustomType, Text};

use skycast_core::advisory::{AdvisoryStore, Conditions};
use skycast_core::config::{AppConfig, FixedCoordinates};
use skycast_core::gateway::GatewayClient;
use skycast_core::location::{FixedGeolocator, Geolocator};
use skycast_core::orchestrator::SearchOrchestrator;
use skycast_core::router::{
    CacheRouter, CacheStore, DiskCacheStore, HttpFetcher, ResourceRequest, RouterConfig,
};
use skycast_core::settings::{FileSettingsStorage, SettingsStore, TimeFormat, Units};

use crate::output::ConsoleSink;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "skycast", version, about = "Proxy-backed weather dashboard")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show current, hourly, and daily weather for a city.
    Show {
        /// City name to search for.
        city: String,
    },

    /// Show weather for the configured fixed location.
    Locate,

    /// Derive farmer advisory tips from given or freshly fetched conditions.
    Tips {
        /// Temperature to derive from instead of fetching weather.
        #[arg(long)]
        temp: Option<f64>,

        /// Humidity percentage to derive from instead of fetching weather.
        #[arg(long)]
        humidity: Option<f64>,
    },

    /// Change a persisted preference.
    Set {
        #[command(subcommand)]
        setting: SettingCommand,
    },

    /// Interactively edit the application configuration.
    Configure,

    /// Manage the offline resource cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum SettingCommand {
    /// Measurement units: "metric" or "imperial". Triggers a re-fetch.
    Units { value: String },

    /// Clock format: "12" or "24". Re-renders cached data when possible.
    TimeFormat { value: String },
}

#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Pre-populate the current cache with the configured assets.
    Warm,

    /// List cache generations and mark stale ones.
    Status,

    /// Delete caches left over from previous versions.
    Clear,

    /// Fetch one URL through the routing policy.
    Fetch { url: String },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = AppConfig::load()?;
        tracing::debug!(proxy = %config.proxy_base_url, "configuration loaded");

        match self.command {
            Command::Show { city } => {
                let orchestrator = build_orchestrator(&config)?;
                orchestrator.search(&city).await;
                orchestrator.idle().await;
                Ok(())
            }
            Command::Locate => {
                let orchestrator = build_orchestrator(&config)?;
                orchestrator.locate().await;
                orchestrator.idle().await;
                Ok(())
            }
            Command::Tips { temp, humidity } => run_tips(&config, temp, humidity).await,
            Command::Set { setting } => run_set(&config, setting).await,
            Command::Configure => run_configure(config),
            Command::Cache { action } => run_cache(&config, action).await,
        }
    }
}

fn build_orchestrator(config: &AppConfig) -> Result<SearchOrchestrator> {
    let gateway = GatewayClient::new(config)?;
    let advisories = AdvisoryStore::new(config);
    let store = SettingsStore::new(Box::new(FileSettingsStorage::at_platform_dir()?));
    let geolocator = config
        .location
        .map(|loc| Box::new(FixedGeolocator::new(loc.lat, loc.lon)) as Box<dyn Geolocator>);
    Ok(SearchOrchestrator::new(
        gateway,
        advisories,
        store,
        Arc::new(ConsoleSink),
        geolocator,
    ))
}

async fn run_tips(config: &AppConfig, temp: Option<f64>, humidity: Option<f64>) -> Result<()> {
    let advisories = AdvisoryStore::new(config);

    let conditions = if temp.is_some() || humidity.is_some() {
        Conditions { temp, humidity }
    } else {
        // No explicit conditions: fetch fresh weather for the persisted place.
        let store = SettingsStore::new(Box::new(FileSettingsStorage::at_platform_dir()?));
        let settings = store.load();
        let gateway = GatewayClient::new(config)?;
        let (lat, lon) = match (settings.current_lat, settings.current_lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => {
                let place = gateway.geocode(&settings.current_city).await?;
                (place.lat, place.lon)
            }
        };
        let bundle = gateway.fetch_weather(lat, lon, settings.units).await?;
        Conditions::from(&bundle.current)
    };

    let tips = advisories.advisories(conditions).await;
    if tips.is_empty() {
        println!("No advisories for the current conditions.");
    } else {
        println!("Farmer tips:");
        for tip in &tips {
            println!("  - {tip}");
        }
    }
    Ok(())
}

async fn run_set(config: &AppConfig, setting: SettingCommand) -> Result<()> {
    let orchestrator = build_orchestrator(config)?;
    match setting {
        SettingCommand::Units { value } => {
            let units = Units::try_from(value.as_str())?;
            orchestrator.set_units(units).await;
        }
        SettingCommand::TimeFormat { value } => {
            let format = TimeFormat::try_from(value.as_str())?;
            orchestrator.set_time_format(format).await;
        }
    }
    orchestrator.idle().await;
    Ok(())
}

fn run_configure(mut config: AppConfig) -> Result<()> {
    config.proxy_base_url = Text::new("Proxy base URL:")
        .with_default(&config.proxy_base_url)
        .prompt()?;
    config.lang = Text::new("Response language code:")
        .with_default(&config.lang)
        .prompt()?;

    let advisory_url = Text::new("Advisory rule table URL (empty to disable):")
        .with_default(config.advisory_url.as_deref().unwrap_or(""))
        .prompt()?;
    config.advisory_url = if advisory_url.trim().is_empty() {
        None
    } else {
        Some(advisory_url.trim().to_string())
    };

    if Confirm::new("Set a fixed location for `skycast locate`?")
        .with_default(config.location.is_some())
        .prompt()?
    {
        let lat = CustomType::<f64>::new("Latitude:").prompt()?;
        let lon = CustomType::<f64>::new("Longitude:").prompt()?;
        config.location = Some(FixedCoordinates { lat, lon });
    }

    config.save()?;
    println!(
        "Configuration saved to {}",
        AppConfig::config_file_path()?.display()
    );
    Ok(())
}

async fn run_cache(config: &AppConfig, action: CacheCommand) -> Result<()> {
    let router_config = RouterConfig::from_offline(&config.offline)?;

    match action {
        CacheCommand::Warm => {
            let router = build_router(router_config)?;
            let cached = router.install().await;
            println!("Cached {cached} asset(s) into {}", router.config().cache_name());
        }
        CacheCommand::Status => {
            let current = router_config.cache_name();
            let store = DiskCacheStore::at_platform_dir()?;
            let names = store.cache_names().await?;
            if names.is_empty() {
                println!("No caches yet. Run `skycast cache warm` first.");
            }
            for name in names {
                let marker = if name == current { "current" } else { "stale" };
                println!("{name}  ({marker})");
            }
        }
        CacheCommand::Clear => {
            let router = build_router(router_config)?;
            let deleted = router.activate().await?;
            if deleted.is_empty() {
                println!("No stale caches to remove.");
            }
            for name in deleted {
                println!("Removed {name}");
            }
        }
        CacheCommand::Fetch { url } => {
            let router = build_router(router_config)?;
            let request = ResourceRequest::parse(&url)?;
            let response = router.handle(&request).await?;
            println!(
                "HTTP {} ({})",
                response.status,
                response.content_type.as_deref().unwrap_or("unknown content type")
            );
            print_body(&response.content_type, &response.body);
        }
    }
    Ok(())
}

fn build_router(router_config: RouterConfig) -> Result<CacheRouter> {
    Ok(CacheRouter::new(
        router_config,
        Box::new(DiskCacheStore::at_platform_dir()?),
        Box::new(HttpFetcher::new()),
    ))
}

fn print_body(content_type: &Option<String>, body: &[u8]) {
    let printable = content_type
        .as_deref()
        .is_some_and(|ct| ct.contains("json") || ct.starts_with("text/"));
    if printable {
        let text = String::from_utf8_lossy(body);
        const MAX: usize = 2000;
        if text.chars().count() > MAX {
            let truncated: String = text.chars().take(MAX).collect();
            println!("{truncated}...");
        } else {
            println!("{text}");
        }
    } else {
        println!("<{} bytes>", body.len());
    }
}
