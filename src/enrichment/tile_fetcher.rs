//! Slippy-map tile math and tile downloads.

use std::f64::consts::PI;

use crate::error::FetchError;
use crate::http_client::{join_url, ServiceClient};

/// Highest zoom level served by standard OSM tile servers.
pub const MAX_TILE_ZOOM: u8 = 19;

/// Web-Mercator tile column/row for a coordinate.
pub fn tile_coordinates(lat: f64, lon: f64, zoom: u8) -> (i64, i64) {
    let scale = 2f64.powi(i32::from(zoom));
    let x = ((lon + 180.0) / 360.0 * scale).floor();
    let lat_rad = lat * PI / 180.0;
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * scale).floor();
    (x as i64, y as i64)
}

pub fn tile_path(lat: f64, lon: f64, zoom: u8) -> String {
    let (x, y) = tile_coordinates(lat, lon, zoom);
    format!("{zoom}/{x}/{y}.png")
}

pub fn tile_url(base_url: &str, lat: f64, lon: f64, zoom: u8) -> String {
    join_url(base_url, &tile_path(lat, lon, zoom))
}

/// Downloads the tile image covering a coordinate.
pub trait TileSource: Send + Sync {
    fn fetch_tile(&self, lat: f64, lon: f64, zoom: u8) -> Result<Vec<u8>, FetchError>;
}

pub struct TileFetcher {
    http: ServiceClient,
    base_url: String,
}

impl TileFetcher {
    pub fn new(http: ServiceClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn validate_tile_bytes(bytes: Vec<u8>) -> Result<Vec<u8>, FetchError> {
        if bytes.is_empty() {
            return Err(FetchError::Decode("tile response was empty".to_string()));
        }
        image::guess_format(&bytes)
            .map_err(|error| FetchError::Decode(format!("tile is not an image: {error}")))?;
        Ok(bytes)
    }
}

impl TileSource for TileFetcher {
    fn fetch_tile(&self, lat: f64, lon: f64, zoom: u8) -> Result<Vec<u8>, FetchError> {
        let url = tile_url(&self.base_url, lat, lon, zoom.min(MAX_TILE_ZOOM));
        let bytes = self.http.get_bytes(&url)?;
        Self::validate_tile_bytes(bytes)
    }
}
