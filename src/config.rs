//! Persistent application configuration model and defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::enrichment::tile_fetcher::MAX_TILE_ZOOM;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Remote service endpoints and request identity.
    pub services: ServicesConfig,
    #[serde(default)]
    /// Detail-view enrichment tuning.
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    /// Local persistence locations.
    pub storage: StorageConfig,
}

/// Base URLs of the four consumed services.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ServicesConfig {
    #[serde(default = "default_catalog_base_url")]
    pub catalog_base_url: String,
    #[serde(default = "default_geocoder_base_url")]
    pub geocoder_base_url: String,
    #[serde(default = "default_tile_base_url")]
    pub tile_base_url: String,
    /// Client-identity header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Whether geocoding results are reused within one process.
#[derive(Debug, Clone, Copy, serde::Deserialize, serde::Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GeoCachePolicy {
    /// Every lookup goes to the service, even for a name resolved before.
    #[default]
    Never,
    /// Successful lookups are reused for the resolver's lifetime.
    Session,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_tile_zoom")]
    pub tile_zoom: u8,
    /// Minimum spacing between geocoding dispatches of one detail view.
    #[serde(default = "default_stagger_interval_ms")]
    pub stagger_interval_ms: u64,
    #[serde(default)]
    pub geocode_cache: GeoCachePolicy,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_favorites_path")]
    pub favorites_path: PathBuf,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            catalog_base_url: default_catalog_base_url(),
            geocoder_base_url: default_geocoder_base_url(),
            tile_base_url: default_tile_base_url(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            tile_zoom: default_tile_zoom(),
            stagger_interval_ms: default_stagger_interval_ms(),
            geocode_cache: GeoCachePolicy::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            favorites_path: default_favorites_path(),
        }
    }
}

impl ServicesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl EnrichmentConfig {
    pub fn stagger_interval(&self) -> Duration {
        Duration::from_millis(self.stagger_interval_ms)
    }
}

fn default_catalog_base_url() -> String {
    "https://groupietrackers.herokuapp.com/api".to_string()
}

fn default_geocoder_base_url() -> String {
    "https://nominatim.openstreetmap.org".to_string()
}

fn default_tile_base_url() -> String {
    "https://tile.openstreetmap.org".to_string()
}

fn default_user_agent() -> String {
    format!(
        "tourmap/{} (concert map browser)",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_tile_zoom() -> u8 {
    12
}

fn default_stagger_interval_ms() -> u64 {
    200
}

fn default_favorites_path() -> PathBuf {
    dirs::data_dir()
        .map(|path| path.join("tourmap"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("favorites.json")
}

/// Clamps values that would break requests or the rate limiter.
pub fn sanitize_config(mut config: Config) -> Config {
    config.services.request_timeout_secs = config.services.request_timeout_secs.max(1);
    if config.services.user_agent.trim().is_empty() {
        config.services.user_agent = default_user_agent();
    }
    config.enrichment.tile_zoom = config.enrichment.tile_zoom.min(MAX_TILE_ZOOM);
    config.enrichment.stagger_interval_ms = config.enrichment.stagger_interval_ms.max(1);
    config
}

#[cfg(test)]
mod tests {
    use super::{sanitize_config, Config, GeoCachePolicy};

    #[test]
    fn test_missing_sections_fall_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
            [enrichment]
            geocode_cache = "session"
            "#,
        )
        .expect("partial config should parse");
        assert_eq!(config.enrichment.geocode_cache, GeoCachePolicy::Session);
        assert_eq!(config.enrichment.tile_zoom, 12);
        assert_eq!(config.services.request_timeout_secs, 10);
        assert!(config.services.user_agent.starts_with("tourmap/"));
    }

    #[test]
    fn test_sanitize_clamps_zoom_interval_and_timeout() {
        let mut config = Config::default();
        config.enrichment.tile_zoom = 30;
        config.enrichment.stagger_interval_ms = 0;
        config.services.request_timeout_secs = 0;
        config.services.user_agent = "   ".to_string();
        let config = sanitize_config(config);
        assert_eq!(config.enrichment.tile_zoom, 19);
        assert_eq!(config.enrichment.stagger_interval_ms, 1);
        assert_eq!(config.services.request_timeout_secs, 1);
        assert!(!config.services.user_agent.trim().is_empty());
    }
}
