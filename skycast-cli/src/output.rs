//! Human-friendly console rendering of orchestrator events.

use chrono::{DateTime, FixedOffset, Utc};
use skycast_core::model::{ConditionTag, GeoResult, WeatherBundle};
use skycast_core::orchestrator::EventSink;
use skycast_core::settings::{Settings, TimeFormat, Units};

/// At most one day of hourly entries is rendered.
pub const MAX_HOURLY_ITEMS: usize = 24;

/// At most a week of daily entries is rendered.
pub const MAX_DAILY_ITEMS: usize = 7;

/// Event sink that prints each signal as it arrives.
pub struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn loading(&self, city: &str) {
        println!("Loading weather for {city}...");
    }

    fn city_resolved(&self, place: &GeoResult) {
        println!("\n{} ({:.4}, {:.4})", place.name, place.lat, place.lon);
    }

    fn weather_resolved(&self, bundle: &WeatherBundle, settings: &Settings) {
        print_bundle(bundle, settings);
    }

    fn advisories_resolved(&self, tips: &[String]) {
        if tips.is_empty() {
            return;
        }
        println!("\nFarmer tips:");
        for tip in tips {
            println!("  - {tip}");
        }
    }

    fn error(&self, message: &str) {
        eprintln!("Error: {message}");
    }
}

fn print_bundle(bundle: &WeatherBundle, settings: &Settings) {
    let current = &bundle.current;
    let units = settings.units;

    println!(
        "\nNow: {} {}",
        format_temperature(current.temp, units),
        describe(&current.weather)
    );
    println!(
        "  feels like {}  humidity {}  wind {}",
        format_temperature(current.feels_like, units),
        format_percent(current.humidity),
        format_wind(current.wind_speed, units)
    );
    if let (Some(sunrise), Some(sunset)) = (current.sunrise, current.sunset) {
        println!(
            "  sunrise {}  sunset {}",
            format_clock(sunrise, bundle.timezone_offset, settings.time_format),
            format_clock(sunset, bundle.timezone_offset, settings.time_format)
        );
    }
    let updated = format_last_update(settings.last_update_timestamp);
    if !updated.is_empty() {
        println!("  {updated}");
    }

    if !bundle.hourly.is_empty() {
        println!("\nNext hours:");
        for entry in bundle.hourly.iter().take(MAX_HOURLY_ITEMS) {
            println!(
                "  {}  {:>5}  {}",
                format_clock(entry.dt, bundle.timezone_offset, settings.time_format),
                format_temperature(entry.temp, units),
                describe(&entry.weather)
            );
        }
    }

    if !bundle.daily.is_empty() {
        println!("\nWeek ahead:");
        for entry in bundle.daily.iter().take(MAX_DAILY_ITEMS) {
            println!(
                "  {}  {:>5} / {:<5}  {}",
                day_of_week(entry.dt, bundle.timezone_offset),
                format_temperature(entry.temp.min, units),
                format_temperature(entry.temp.max, units),
                describe(&entry.weather)
            );
        }
    }
}

pub fn format_temperature(temp: Option<f64>, units: Units) -> String {
    let suffix = match units {
        Units::Metric => "C",
        Units::Imperial => "F",
    };
    match temp {
        Some(t) => format!("{}°{suffix}", t.round() as i64),
        None => "-°".to_string(),
    }
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{}%", v.round() as i64),
        None => "-".to_string(),
    }
}

pub fn format_wind(speed: Option<f64>, units: Units) -> String {
    match speed {
        Some(s) => match units {
            Units::Metric => format!("{s:.1} m/s"),
            Units::Imperial => format!("{s:.1} mph"),
        },
        None => "-".to_string(),
    }
}

/// Local wall-clock time at the bundle's location.
pub fn format_clock(dt: i64, timezone_offset: i64, format: TimeFormat) -> String {
    let Some(utc) = DateTime::from_timestamp(dt, 0) else {
        return "-".to_string();
    };
    let Some(offset) = FixedOffset::east_opt(timezone_offset as i32) else {
        return "-".to_string();
    };
    let local = utc.with_timezone(&offset);
    match format {
        TimeFormat::H24 => local.format("%H:%M").to_string(),
        TimeFormat::H12 => local.format("%I:%M %p").to_string(),
    }
}

pub fn day_of_week(dt: i64, timezone_offset: i64) -> String {
    let Some(utc) = DateTime::from_timestamp(dt, 0) else {
        return "-".to_string();
    };
    let Some(offset) = FixedOffset::east_opt(timezone_offset as i32) else {
        return "-".to_string();
    };
    utc.with_timezone(&offset).format("%a").to_string()
}

/// Relative "updated ... ago" line from a millisecond timestamp.
pub fn format_last_update(timestamp_ms: Option<i64>) -> String {
    let Some(ts) = timestamp_ms else {
        return String::new();
    };
    let seconds = Utc::now().timestamp_millis().saturating_sub(ts) / 1000;
    if seconds < 5 {
        "updated just now".to_string()
    } else if seconds < 60 {
        format!("updated {seconds} s ago")
    } else if seconds < 3600 {
        format!("updated {} min ago", seconds / 60)
    } else {
        format!("updated {} h ago", seconds / 3600)
    }
}

fn describe(tags: &[ConditionTag]) -> String {
    tags.first()
        .and_then(|tag| tag.description.clone())
        .unwrap_or_default()
}
