//! Integration tests for `GatewayClient` using wiremock HTTP mocks.

mod common;

use common::{geo_entry, weather_payload};
use serde_json::json;
use skycast_core::error::GatewayError;
use skycast_core::gateway::GatewayClient;
use skycast_core::settings::Units;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> GatewayClient {
    GatewayClient::with_base_url(base_url, "en").expect("client construction should not fail")
}

#[tokio::test]
async fn status_codes_map_to_exact_error_kinds() {
    let cases: Vec<(u16, fn(&GatewayError) -> bool)> = vec![
        (401, |e| matches!(e, GatewayError::AuthFailure)),
        (404, |e| matches!(e, GatewayError::NotFound(_))),
        (429, |e| matches!(e, GatewayError::RateLimited)),
        (500, |e| matches!(e, GatewayError::UpstreamUnavailable { status: 500 })),
        (503, |e| matches!(e, GatewayError::UpstreamUnavailable { status: 503 })),
    ];

    for (status, matches_kind) in cases {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(
                // body content must not influence the classification
                ResponseTemplate::new(status).set_body_json(json!({ "message": "whatever" })),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let err = client
            .fetch_weather(10.0, 20.0, Units::Metric)
            .await
            .expect_err("non-2xx must fail");
        assert!(matches_kind(&err), "status {status} mapped to {err:?}");
    }
}

#[tokio::test]
async fn geocode_empty_array_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode"))
        .and(query_param("city", "Nowhere"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .geocode("Nowhere")
        .await
        .expect_err("empty array means not found");
    assert!(matches!(err, GatewayError::NotFound(_)));
    assert!(err.to_string().contains("Nowhere"));
}

#[tokio::test]
async fn geocode_extracts_the_first_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode"))
        .and(query_param("city", "X"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([geo_entry("X", 10.0, 20.0), geo_entry("Y", 1.0, 2.0)])),
        )
        .mount(&server)
        .await;

    let place = test_client(&server.uri()).geocode("X").await.expect("geocode");
    assert_eq!(place.lat, 10.0);
    assert_eq!(place.lon, 20.0);
    assert_eq!(place.name, "X");
}

#[tokio::test]
async fn geocode_prefers_the_localized_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "lat": 46.95, "lon": 7.45, "name": "Bern",
            "local_names": { "de": "Bern", "ru": "Берн" }
        }])))
        .mount(&server)
        .await;

    let client = GatewayClient::with_base_url(&server.uri(), "ru").expect("client");
    let place = client.geocode("Bern").await.expect("geocode");
    assert_eq!(place.name, "Берн");
}

#[tokio::test]
async fn success_with_non_json_body_is_unexpected_format() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy error page</html>"))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .fetch_weather(1.0, 2.0, Units::Metric)
        .await
        .expect_err("non-JSON 2xx must fail");
    assert!(matches!(err, GatewayError::UnexpectedFormat(_)));
}

#[tokio::test]
async fn weather_payload_missing_a_section_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "current": { "dt": 0 },
            "hourly": []
            // daily is missing
        })))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .fetch_weather(1.0, 2.0, Units::Metric)
        .await
        .expect_err("malformed bundle must fail");
    assert!(matches!(err, GatewayError::UnexpectedFormat(_)));
}

#[tokio::test]
async fn weather_passes_units_and_lang_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("units", "imperial"))
        .and(query_param("lang", "en"))
        .and(query_param("lat", "10"))
        .and(query_param("lon", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_payload(61.0, 40.0)))
        .expect(1)
        .mount(&server)
        .await;

    let bundle = test_client(&server.uri())
        .fetch_weather(10.0, 20.0, Units::Imperial)
        .await
        .expect("weather");
    assert_eq!(bundle.current.temp, Some(61.0));
}

#[tokio::test]
async fn other_status_carries_the_upstream_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geocode"))
        .respond_with(
            ResponseTemplate::new(418).set_body_json(json!({ "message": "nothing to geocode" })),
        )
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .geocode("X")
        .await
        .expect_err("418 must fail");
    match err {
        GatewayError::Generic { message, .. } => assert_eq!(message, "nothing to geocode"),
        other => panic!("expected Generic, got {other:?}"),
    }
}

#[tokio::test]
async fn reverse_geocode_picks_the_best_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reverse-geocode"))
        .and(query_param("lat", "47.6062"))
        .and(query_param("lon", "-122.3321"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "name": "Seattle" }])))
        .mount(&server)
        .await;

    let name = test_client(&server.uri())
        .reverse_geocode(47.6062, -122.3321)
        .await
        .expect("reverse geocode");
    assert_eq!(name, "Seattle");
}

#[tokio::test]
async fn reverse_geocode_empty_array_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/reverse-geocode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let err = test_client(&server.uri())
        .reverse_geocode(0.0, 0.0)
        .await
        .expect_err("no name available");
    assert!(matches!(err, GatewayError::NotFound(_)));
}
