//! Shared helpers for the integration suites.
#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::{Value, json};
use skycast_core::model::{GeoResult, WeatherBundle};
use skycast_core::orchestrator::EventSink;
use skycast_core::settings::Settings;

/// Sink that records every emission for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Loading(String),
    City(String),
    Weather { temp: Option<f64> },
    Advisories(Vec<String>),
    Error(String),
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn cities(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::City(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn weather_count(&self) -> usize {
        self.events()
            .into_iter()
            .filter(|event| matches!(event, Event::Weather { .. }))
            .count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn loading(&self, city: &str) {
        self.events.lock().push(Event::Loading(city.to_string()));
    }

    fn city_resolved(&self, place: &GeoResult) {
        self.events.lock().push(Event::City(place.name.clone()));
    }

    fn weather_resolved(&self, bundle: &WeatherBundle, _settings: &Settings) {
        self.events.lock().push(Event::Weather {
            temp: bundle.current.temp,
        });
    }

    fn advisories_resolved(&self, tips: &[String]) {
        self.events.lock().push(Event::Advisories(tips.to_vec()));
    }

    fn error(&self, message: &str) {
        self.events.lock().push(Event::Error(message.to_string()));
    }
}

/// One geocode entry the proxy would return.
pub fn geo_entry(name: &str, lat: f64, lon: f64) -> Value {
    json!({ "lat": lat, "lon": lon, "name": name })
}

/// A minimal but valid weather bundle payload.
pub fn weather_payload(temp: f64, humidity: f64) -> Value {
    json!({
        "current": { "dt": 1_700_000_000, "temp": temp, "humidity": humidity },
        "hourly": [ { "dt": 1_700_003_600, "temp": temp } ],
        "daily": [ { "dt": 1_700_000_000, "temp": { "min": temp - 4.0, "max": temp + 4.0 } } ],
        "timezone_offset": 0
    })
}
