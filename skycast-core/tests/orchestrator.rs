//! Integration tests for the search orchestrator: supersession, debounce,
//! and settings-change flows, against a wiremock proxy.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Event, RecordingSink, geo_entry, weather_payload};
use serde_json::json;
use skycast_core::advisory::AdvisoryStore;
use skycast_core::gateway::GatewayClient;
use skycast_core::location::{FixedGeolocator, Geolocator};
use skycast_core::orchestrator::{Phase, SearchOrchestrator};
use skycast_core::settings::{MemoryStorage, SettingsStore, TimeFormat, Units};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn build(
    server: &MockServer,
    sink: Arc<RecordingSink>,
    geolocator: Option<Box<dyn Geolocator>>,
) -> SearchOrchestrator {
    let gateway = GatewayClient::with_base_url(&server.uri(), "en").expect("client");
    let advisories = AdvisoryStore::with_sources(None, None);
    let store = SettingsStore::new(Box::new(MemoryStorage::new()));
    SearchOrchestrator::new(gateway, advisories, store, sink, geolocator)
}

async fn mount_weather(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_payload(12.5, 60.0)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn later_search_supersedes_an_earlier_one() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode"))
        .and(query_param("city", "Aberdeen"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([geo_entry("Aberdeen", 57.15, -2.09)]))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/geocode"))
        .and(query_param("city", "Bern"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([geo_entry("Bern", 46.95, 7.45)])))
        .mount(&server)
        .await;
    mount_weather(&server).await;

    let sink = Arc::new(RecordingSink::default());
    let orch = build(&server, Arc::clone(&sink), None);

    // "Aberdeen" is still waiting on its geocode when "Bern" starts.
    let slow = orch.clone();
    let slow_task = tokio::spawn(async move {
        slow.search("Aberdeen").await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    orch.search("Bern").await;
    slow_task.await.expect("superseded search still completes quietly");
    orch.idle().await;

    assert_eq!(sink.cities(), vec!["Bern"]);
    assert_eq!(orch.settings().current_city, "Bern");
    assert_eq!(sink.weather_count(), 1);
    assert!(sink.errors().is_empty());
    assert_eq!(orch.phase(), Phase::Success);
}

#[tokio::test]
async fn geocode_failure_applies_no_partial_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let orch = build(&server, Arc::clone(&sink), None);
    let before = orch.settings();

    orch.search("Nowhere").await;

    assert_eq!(orch.phase(), Phase::Failed);
    assert_eq!(orch.settings(), before);
    assert_eq!(sink.cities(), Vec::<String>::new());
    assert_eq!(sink.weather_count(), 0);
    assert_eq!(sink.errors().len(), 1);
}

#[tokio::test]
async fn rapid_keystrokes_debounce_to_a_single_search() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode"))
        .and(query_param("city", "Bern"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([geo_entry("Bern", 46.95, 7.45)])))
        .expect(1)
        .mount(&server)
        .await;
    mount_weather(&server).await;

    let sink = Arc::new(RecordingSink::default());
    let orch = build(&server, Arc::clone(&sink), None);
    orch.set_debounce_delay(Duration::from_millis(50));

    orch.input_changed("B"); // below the minimum length, never fires
    orch.input_changed("Be");
    orch.input_changed("Ber");
    orch.input_changed("Bern");
    tokio::time::sleep(Duration::from_millis(250)).await;
    orch.idle().await;

    assert_eq!(sink.cities(), vec!["Bern"]);
    assert_eq!(orch.settings().current_city, "Bern");
    assert!(sink.errors().is_empty());
    // the geocode mock's expect(1) verifies no intermediate search fired
}

#[tokio::test]
async fn short_input_never_fires() {
    let server = MockServer::start().await;
    let sink = Arc::new(RecordingSink::default());
    let orch = build(&server, Arc::clone(&sink), None);
    orch.set_debounce_delay(Duration::from_millis(50));

    orch.input_changed("B");
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(sink.events().is_empty());
    assert_eq!(orch.phase(), Phase::Idle);
}

#[tokio::test]
async fn empty_submit_is_rejected_up_front() {
    let server = MockServer::start().await;
    let sink = Arc::new(RecordingSink::default());
    let orch = build(&server, Arc::clone(&sink), None);

    orch.search("   ").await;

    assert_eq!(sink.errors(), vec!["enter a city name to search"]);
    assert_eq!(orch.phase(), Phase::Idle);
}

#[tokio::test]
async fn time_format_change_reuses_the_cached_bundle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([geo_entry("Bern", 46.95, 7.45)])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_payload(12.5, 60.0)))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let orch = build(&server, Arc::clone(&sink), None);

    orch.search("Bern").await;
    orch.idle().await;
    orch.set_time_format(TimeFormat::H12).await;

    assert_eq!(orch.settings().time_format, TimeFormat::H12);
    assert_eq!(sink.weather_count(), 2);
    // the weather mock's expect(1) verifies the change did not refetch
}

#[tokio::test]
async fn time_format_change_without_a_bundle_reruns_the_search() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode"))
        .and(query_param("city", "Moscow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([geo_entry("Moscow", 55.75, 37.61)])))
        .expect(1)
        .mount(&server)
        .await;
    mount_weather(&server).await;

    let sink = Arc::new(RecordingSink::default());
    let orch = build(&server, Arc::clone(&sink), None);

    orch.set_time_format(TimeFormat::H12).await;
    orch.idle().await;

    assert_eq!(sink.cities(), vec!["Moscow"]);
    assert_eq!(sink.weather_count(), 1);
}

#[tokio::test]
async fn unit_change_reruns_with_the_new_units() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([geo_entry("Bern", 46.95, 7.45)])))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_payload(12.5, 60.0)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("units", "imperial"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_payload(54.5, 60.0)))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(RecordingSink::default());
    let orch = build(&server, Arc::clone(&sink), None);

    orch.search("Bern").await;
    orch.set_units(Units::Imperial).await;
    orch.idle().await;

    assert_eq!(orch.settings().units, Units::Imperial);
    assert_eq!(sink.weather_count(), 2);
    let temps: Vec<Option<f64>> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Event::Weather { temp } => Some(temp),
            _ => None,
        })
        .collect();
    assert_eq!(temps, vec![Some(12.5), Some(54.5)]);
}

#[tokio::test]
async fn locate_feeds_the_pipeline_from_the_resolved_position() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reverse-geocode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "name": "Bergen" }])))
        .mount(&server)
        .await;
    mount_weather(&server).await;

    let sink = Arc::new(RecordingSink::default());
    let orch = build(
        &server,
        Arc::clone(&sink),
        Some(Box::new(FixedGeolocator::new(60.39, 5.32))),
    );

    orch.locate().await;
    orch.idle().await;

    assert_eq!(sink.cities(), vec!["Bergen"]);
    let settings = orch.settings();
    assert_eq!(settings.current_city, "Bergen");
    assert_eq!(settings.current_lat, Some(60.39));
    assert_eq!(orch.phase(), Phase::Success);
}

#[tokio::test]
async fn locate_without_a_capability_fails_with_unsupported() {
    let server = MockServer::start().await;
    let sink = Arc::new(RecordingSink::default());
    let orch = build(&server, Arc::clone(&sink), None);

    orch.locate().await;

    assert_eq!(orch.phase(), Phase::Failed);
    let errors = sink.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("geolocation capability"));
}

#[tokio::test]
async fn advisories_trail_the_weather_signal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([geo_entry("Bern", 46.95, 7.45)])))
        .mount(&server)
        .await;
    mount_weather(&server).await;

    let sink = Arc::new(RecordingSink::default());
    let orch = build(&server, Arc::clone(&sink), None);

    orch.search("Bern").await;
    orch.idle().await;

    // no rule table configured: the advisory step degrades to an empty list,
    // emitted after the weather signal
    let events = sink.events();
    let weather_pos = events
        .iter()
        .position(|event| matches!(event, Event::Weather { .. }))
        .expect("weather emitted");
    let advisory_pos = events
        .iter()
        .position(|event| matches!(event, Event::Advisories(_)))
        .expect("advisories emitted");
    assert!(advisory_pos > weather_pos);
    assert_eq!(events[advisory_pos], Event::Advisories(Vec::new()));
}
