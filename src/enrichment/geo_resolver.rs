//! Place name → coordinate lookups against the geocoding service.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use log::debug;
use serde_json::Value;

use crate::catalog::models::GeoCoordinate;
use crate::config::GeoCachePolicy;
use crate::error::FetchError;
use crate::http_client::{join_url, ServiceClient};

/// Resolves a human-readable place to a coordinate.
pub trait Geocoder: Send + Sync {
    fn resolve(&self, place: &str) -> Result<GeoCoordinate, FetchError>;
}

#[derive(Debug, serde::Deserialize)]
struct GeocodeHit {
    lat: Value,
    lon: Value,
}

/// Geocoding client. Whether identical names are re-resolved is decided by
/// [`GeoCachePolicy`].
pub struct GeoResolver {
    http: ServiceClient,
    base_url: String,
    memo: Option<Mutex<HashMap<String, GeoCoordinate>>>,
}

impl GeoResolver {
    pub fn new(http: ServiceClient, base_url: impl Into<String>, policy: GeoCachePolicy) -> Self {
        let memo = match policy {
            GeoCachePolicy::Never => None,
            GeoCachePolicy::Session => Some(Mutex::new(HashMap::new())),
        };
        Self {
            http,
            base_url: base_url.into(),
            memo,
        }
    }

    pub fn search_url(base_url: &str, place: &str) -> String {
        format!(
            "{}?q={}&format=json&limit=1",
            join_url(base_url, "search"),
            urlencoding::encode(place.trim())
        )
    }

    fn coordinate_component(value: &Value) -> Option<f64> {
        match value {
            Value::String(text) => text.trim().parse::<f64>().ok(),
            Value::Number(number) => number.as_f64(),
            _ => None,
        }
    }

    /// Picks the first hit of a geocoder response.
    fn parse_hits(hits: &[GeocodeHit]) -> Result<GeoCoordinate, FetchError> {
        let first = hits.first().ok_or(FetchError::NotFound)?;
        let lat = Self::coordinate_component(&first.lat)
            .ok_or_else(|| FetchError::Decode(format!("invalid latitude {}", first.lat)))?;
        let lon = Self::coordinate_component(&first.lon)
            .ok_or_else(|| FetchError::Decode(format!("invalid longitude {}", first.lon)))?;
        Ok(GeoCoordinate { lat, lon })
    }

    fn memoized(&self, place: &str) -> Option<GeoCoordinate> {
        let memo = self.memo.as_ref()?;
        memo.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(place)
            .copied()
    }

    fn remember(&self, place: &str, coordinate: GeoCoordinate) {
        if let Some(memo) = self.memo.as_ref() {
            memo.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(place.to_string(), coordinate);
        }
    }
}

impl Geocoder for GeoResolver {
    fn resolve(&self, place: &str) -> Result<GeoCoordinate, FetchError> {
        if let Some(coordinate) = self.memoized(place) {
            debug!("Geocode '{place}': served from session memo");
            return Ok(coordinate);
        }
        let url = Self::search_url(&self.base_url, place);
        let hits: Vec<GeocodeHit> = self.http.get_json(&url)?;
        let coordinate = Self::parse_hits(&hits)?;
        self.remember(place, coordinate);
        Ok(coordinate)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{GeoResolver, GeocodeHit};
    use crate::catalog::models::GeoCoordinate;
    use crate::config::GeoCachePolicy;
    use crate::error::FetchError;
    use crate::http_client::ServiceClient;

    fn hits(json: &str) -> Vec<GeocodeHit> {
        serde_json::from_str(json).expect("hits should decode")
    }

    #[test]
    fn test_search_url_encodes_place_and_fixes_limit() {
        assert_eq!(
            GeoResolver::search_url("https://geo.test/", "San Francisco, Ca"),
            "https://geo.test/search?q=San%20Francisco%2C%20Ca&format=json&limit=1"
        );
    }

    #[test]
    fn test_parse_hits_accepts_string_coordinates() {
        let coordinate = GeoResolver::parse_hits(&hits(
            r#"[{"lat": "48.8566", "lon": "2.3522", "display_name": "Paris"}]"#,
        ))
        .expect("first hit should parse");
        assert_eq!(
            coordinate,
            GeoCoordinate {
                lat: 48.8566,
                lon: 2.3522
            }
        );
    }

    #[test]
    fn test_parse_hits_accepts_numeric_coordinates() {
        let coordinate = GeoResolver::parse_hits(&hits(r#"[{"lat": -33.5, "lon": 151.25}]"#))
            .expect("numeric hit should parse");
        assert_eq!(coordinate.lat, -33.5);
        assert_eq!(coordinate.lon, 151.25);
    }

    #[test]
    fn test_parse_hits_empty_array_is_not_found() {
        assert_eq!(GeoResolver::parse_hits(&hits("[]")), Err(FetchError::NotFound));
    }

    #[test]
    fn test_parse_hits_rejects_garbage_latitude() {
        let result = GeoResolver::parse_hits(&hits(r#"[{"lat": "north", "lon": "1"}]"#));
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_memo_is_only_active_for_session_policy() {
        let http = ServiceClient::new("tourmap-tests/0.1", Duration::from_secs(1));
        let coordinate = GeoCoordinate { lat: 1.0, lon: 2.0 };

        let never = GeoResolver::new(http.clone(), "https://geo.test", GeoCachePolicy::Never);
        never.remember("Paris", coordinate);
        assert_eq!(never.memoized("Paris"), None);

        let session = GeoResolver::new(http, "https://geo.test", GeoCachePolicy::Session);
        session.remember("Paris", coordinate);
        assert_eq!(session.memoized("Paris"), Some(coordinate));
    }
}
