#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Place-name geocoding for works locations.
//!
//! Works sheets locate a project by gram panchayat and block only, so
//! lookups are free-text queries ("Aalnar, Geedam, Dantewada") against
//! Nominatim / `OpenStreetMap`. The public instance allows one request per
//! second; [`nominatim::NominatimClient`] enforces that itself.
//!
//! Lookups never fail: every transport or parse problem is logged and
//! reported as "not found", and the caller moves on to the next query
//! variant from [`query`].

pub mod nominatim;
pub mod query;

use async_trait::async_trait;
use dmf_works_models::Coordinates;
use thiserror::Error;

/// A free-text place lookup.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolves `query` to a point, or `None` if nothing usable came back.
    async fn lookup(&self, query: &str) -> Option<Coordinates>;
}

/// Errors inside a single geocoding request. Never escapes
/// [`Geocoder::lookup`].
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Service answered with a non-success status.
    #[error("Unexpected status {0}")]
    Status(reqwest::StatusCode),
}

/// Tries each query in order and returns the first hit along with the
/// query that produced it.
pub async fn lookup_first<'q>(
    geocoder: &dyn Geocoder,
    queries: &'q [String],
) -> Option<(&'q str, Coordinates)> {
    for query in queries {
        if let Some(coords) = geocoder.lookup(query).await {
            return Some((query.as_str(), coords));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Scripted {
        hit_on: &'static str,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Geocoder for Scripted {
        async fn lookup(&self, query: &str) -> Option<Coordinates> {
            self.calls.lock().unwrap().push(query.to_owned());
            (query == self.hit_on).then(|| Coordinates::checked(18.95, 81.26)).flatten()
        }
    }

    #[tokio::test]
    async fn stops_at_first_hit() {
        let geocoder = Scripted {
            hit_on: "b",
            calls: Mutex::new(Vec::new()),
        };
        let queries = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];

        let (query, coords) = lookup_first(&geocoder, &queries).await.unwrap();

        assert_eq!(query, "b");
        assert!((coords.latitude - 18.95).abs() < f64::EPSILON);
        assert_eq!(*geocoder.calls.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn exhausting_variants_is_a_miss() {
        let geocoder = Scripted {
            hit_on: "zzz",
            calls: Mutex::new(Vec::new()),
        };
        let queries = vec!["a".to_owned(), "b".to_owned()];

        assert!(lookup_first(&geocoder, &queries).await.is_none());
        assert_eq!(geocoder.calls.lock().unwrap().len(), 2);
    }
}
