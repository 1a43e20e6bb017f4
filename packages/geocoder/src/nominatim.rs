//! Nominatim / `OpenStreetMap` free-text geocoder.
//!
//! Nominatim has strict rate limits: **1 request per second** maximum, and
//! requests without an identifying `User-Agent` are refused.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use std::time::Duration;

use async_trait::async_trait;
use dmf_works_models::Coordinates;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{GeocodeError, Geocoder};

/// Rate-limited Nominatim client.
///
/// Calls are serialized: a lookup holds the throttle for the whole request,
/// so concurrent callers queue behind each other and consecutive requests
/// are always at least `rate_limit` apart.
pub struct NominatimClient {
    client: reqwest::Client,
    base_url: String,
    rate_limit: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl NominatimClient {
    /// Builds a client with a request timeout and identifying user agent.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        user_agent: &str,
        timeout: Duration,
        rate_limit: Duration,
    ) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_owned(),
            rate_limit,
            last_request: Mutex::new(None),
        })
    }

    /// Sends one search request. Must be called with the throttle held.
    async fn search(&self, query: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GeocodeError::Status(resp.status()));
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(&body)
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn lookup(&self, query: &str) -> Option<Coordinates> {
        let mut last = self.last_request.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.rate_limit {
                tokio::time::sleep(self.rate_limit - elapsed).await;
            }
        }

        let result = self.search(query).await;
        *last = Some(Instant::now());
        drop(last);

        match result {
            Ok(Some(coords)) => {
                log::debug!(
                    "Nominatim: '{query}' -> ({}, {})",
                    coords.latitude,
                    coords.longitude
                );
                Some(coords)
            }
            Ok(None) => {
                log::debug!("Nominatim: no match for '{query}'");
                None
            }
            Err(e) => {
                log::warn!("Nominatim error for '{query}': {e}");
                None
            }
        }
    }
}

/// Parses a Nominatim JSON response.
///
/// An empty array is "no match". A first result with unusable coordinates
/// is a parse error.
///
/// # Errors
///
/// Returns [`GeocodeError::Parse`] if the body is not a result array or the
/// first result lacks valid `lat`/`lon` values.
pub fn parse_response(body: &serde_json::Value) -> Result<Option<Coordinates>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let axis = |name: &str| {
        first[name]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .or_else(|| first[name].as_f64())
            .ok_or_else(|| GeocodeError::Parse {
                message: format!("Missing {name} in Nominatim response"),
            })
    };

    let lat = axis("lat")?;
    let lon = axis("lon")?;

    Coordinates::checked(lat, lon)
        .map(Some)
        .ok_or_else(|| GeocodeError::Parse {
            message: format!("Out-of-range point ({lat}, {lon}) in Nominatim response"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nominatim_result() {
        let body = serde_json::json!([{
            "lat": "18.9512",
            "lon": "81.2634",
            "display_name": "Aalnar, Geedam, Dantewada, Chhattisgarh, India"
        }]);
        let result = parse_response(&body).unwrap().unwrap();
        assert!((result.latitude - 18.9512).abs() < 1e-6);
        assert!((result.longitude - 81.2634).abs() < 1e-6);
    }

    #[test]
    fn parses_nominatim_empty() {
        let body = serde_json::json!([]);
        assert!(parse_response(&body).unwrap().is_none());
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(parse_response(&serde_json::json!({"error": "busy"})).is_err());
        assert!(parse_response(&serde_json::json!([{"lat": "x", "lon": "81.2"}])).is_err());
        assert!(parse_response(&serde_json::json!([{"lat": "0", "lon": "0"}])).is_err());
    }

    #[tokio::test]
    async fn unreachable_service_is_not_found() {
        let client = NominatimClient::new(
            "http://127.0.0.1:9/search",
            "dmf_works_test/0.1",
            Duration::from_millis(500),
            Duration::from_millis(0),
        )
        .unwrap();

        assert!(client.lookup("Aalnar, Geedam").await.is_none());
    }

    #[tokio::test]
    async fn consecutive_lookups_wait_for_rate_limit() {
        let client = NominatimClient::new(
            "http://127.0.0.1:9/search",
            "dmf_works_test/0.1",
            Duration::from_millis(500),
            Duration::from_millis(300),
        )
        .unwrap();

        let start = Instant::now();
        assert!(client.lookup("Aalnar, Geedam").await.is_none());
        assert!(client.lookup("Badegadam, Katekalyan").await.is_none());
        assert!(start.elapsed() >= Duration::from_millis(300));
    }
}
