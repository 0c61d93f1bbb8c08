//! Distance Matrix travel-time provider.
//!
//! Talks to a Google Distance Matrix compatible endpoint and maps the
//! response for a single origin/destination pair onto [`TravelTime`].
//! Traffic-aware durations (`duration_in_traffic`) are preferred when the
//! API returns them.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::monitor::error::ProviderError;
use crate::monitor::provider::{ProviderResult, TravelTimeProvider};
use crate::monitor::types::TravelTime;

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com";

#[derive(Clone)]
pub struct DistanceMatrixClient {
    base_url: String,
    http: Client,
}

impl DistanceMatrixClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<DistanceMatrixRow>,
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixRow {
    elements: Vec<DistanceMatrixElement>,
}

#[derive(Debug, Deserialize)]
struct DistanceMatrixElement {
    status: String,
    duration: Option<TextValue>,
    duration_in_traffic: Option<TextValue>,
    distance: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    text: String,
    value: i64,
}

fn status_error(status: &str, detail: Option<String>) -> ProviderError {
    let message = match detail {
        Some(detail) => format!("{}: {}", status, detail),
        None => status.to_string(),
    };
    match status {
        "REQUEST_DENIED" => ProviderError::AuthError { message },
        "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => ProviderError::RateLimitExceeded,
        "UNKNOWN_ERROR" => ProviderError::ServiceUnavailable,
        _ => ProviderError::FormatError { message },
    }
}

/// Seconds to whole minutes, rounding to nearest.
fn seconds_to_minutes(seconds: i64) -> i64 {
    (seconds + 30).div_euclid(60)
}

impl DistanceMatrixResponse {
    fn into_travel_time(self) -> ProviderResult<TravelTime> {
        if self.status != "OK" {
            return Err(status_error(&self.status, self.error_message));
        }

        let element = self
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.elements.into_iter().next())
            .ok_or_else(|| ProviderError::FormatError {
                message: "Response contained no route elements".to_string(),
            })?;

        if element.status != "OK" {
            return Err(ProviderError::FormatError {
                message: format!("Route element status {}", element.status),
            });
        }

        let duration = element
            .duration_in_traffic
            .or(element.duration)
            .ok_or_else(|| ProviderError::FormatError {
                message: "Route element is missing a duration".to_string(),
            })?;
        let distance = element.distance.ok_or_else(|| ProviderError::FormatError {
            message: "Route element is missing a distance".to_string(),
        })?;

        if duration.value < 0 {
            return Err(ProviderError::FormatError {
                message: format!("Negative duration {}", duration.value),
            });
        }

        Ok(TravelTime {
            duration_minutes: seconds_to_minutes(duration.value),
            duration_text: duration.text,
            distance_text: distance.text,
        })
    }
}

#[async_trait]
impl TravelTimeProvider for DistanceMatrixClient {
    async fn fetch_travel_time(
        &self,
        source: &str,
        destination: &str,
        api_key: &str,
    ) -> ProviderResult<TravelTime> {
        let url = format!("{}/maps/api/distancematrix/json", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("origins", source),
                ("destinations", destination),
                ("departure_time", "now"),
                ("key", api_key),
            ])
            .send()
            .await
            .map_err(|err| ProviderError::NetworkError {
                message: format!("Failed to reach distance matrix API: {}", err),
            })?;

        if !response.status().is_success() {
            return Err(ProviderError::NetworkError {
                message: format!("Distance matrix API returned HTTP {}", response.status()),
            });
        }

        let body: DistanceMatrixResponse = response.json().await.map_err(|err| {
            ProviderError::FormatError {
                message: format!("Failed to parse distance matrix response: {}", err),
            }
        })?;

        body.into_travel_time()
    }

    fn provider_name(&self) -> &str {
        "DistanceMatrix"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OK_BODY: &str = r#"{
        "status": "OK",
        "origin_addresses": ["Home"],
        "destination_addresses": ["Office"],
        "rows": [{
            "elements": [{
                "status": "OK",
                "distance": { "text": "12.4 km", "value": 12400 },
                "duration": { "text": "21 mins", "value": 1250 },
                "duration_in_traffic": { "text": "27 mins", "value": 1610 }
            }]
        }]
    }"#;

    async fn server_with(body: &str, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/distancematrix/json"))
            .respond_with(ResponseTemplate::new(status).set_body_raw(body, "application/json"))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn prefers_traffic_duration() {
        let server = server_with(OK_BODY, 200).await;
        let client = DistanceMatrixClient::new(server.uri());

        let travel = assert_ok!(client.fetch_travel_time("Home", "Office", "k").await);
        assert_eq!(travel.duration_minutes, 27);
        assert_eq!(travel.duration_text, "27 mins");
        assert_eq!(travel.distance_text, "12.4 km");
    }

    #[tokio::test]
    async fn sends_origin_destination_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maps/api/distancematrix/json"))
            .and(query_param("origins", "1 Main St"))
            .and(query_param("destinations", "99 Market St"))
            .and(query_param("key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(OK_BODY, "application/json"))
            .expect(1)
            .mount(&server)
            .await;

        let client = DistanceMatrixClient::new(server.uri());
        assert_ok!(client.fetch_travel_time("1 Main St", "99 Market St", "secret").await);
    }

    #[tokio::test]
    async fn falls_back_to_plain_duration() {
        let body = r#"{
            "status": "OK",
            "rows": [{ "elements": [{
                "status": "OK",
                "distance": { "text": "3 km", "value": 3000 },
                "duration": { "text": "9 mins", "value": 545 }
            }]}]
        }"#;
        let server = server_with(body, 200).await;
        let client = DistanceMatrixClient::new(server.uri());

        let travel = assert_ok!(client.fetch_travel_time("a", "b", "k").await);
        assert_eq!(travel.duration_minutes, 9);
    }

    #[tokio::test]
    async fn http_error_is_network_error() {
        let server = server_with("oops", 500).await;
        let client = DistanceMatrixClient::new(server.uri());

        let err = assert_err!(client.fetch_travel_time("a", "b", "k").await);
        assert!(matches!(err, ProviderError::NetworkError { .. }));
    }

    #[tokio::test]
    async fn denied_request_is_auth_error() {
        let body = r#"{ "status": "REQUEST_DENIED", "error_message": "The provided API key is invalid.", "rows": [] }"#;
        let server = server_with(body, 200).await;
        let client = DistanceMatrixClient::new(server.uri());

        let err = assert_err!(client.fetch_travel_time("a", "b", "bad").await);
        assert!(matches!(err, ProviderError::AuthError { .. }));
    }

    #[tokio::test]
    async fn unroutable_element_is_format_error() {
        let body = r#"{ "status": "OK", "rows": [{ "elements": [{ "status": "ZERO_RESULTS" }] }] }"#;
        let server = server_with(body, 200).await;
        let client = DistanceMatrixClient::new(server.uri());

        let err = assert_err!(client.fetch_travel_time("a", "b", "k").await);
        assert!(matches!(err, ProviderError::FormatError { .. }));
    }

    #[tokio::test]
    async fn malformed_payload_is_format_error() {
        let server = server_with("{\"unexpected\": true}", 200).await;
        let client = DistanceMatrixClient::new(server.uri());

        let err = assert_err!(client.fetch_travel_time("a", "b", "k").await);
        assert!(matches!(err, ProviderError::FormatError { .. }));
    }

    #[test]
    fn seconds_round_to_nearest_minute() {
        assert_eq!(seconds_to_minutes(0), 0);
        assert_eq!(seconds_to_minutes(29), 0);
        assert_eq!(seconds_to_minutes(30), 1);
        assert_eq!(seconds_to_minutes(1250), 21);
        assert_eq!(seconds_to_minutes(1610), 27);
    }
}
