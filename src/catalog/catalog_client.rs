//! Client for the catalog service: artists, relations and the location index.

use std::collections::HashMap;

use log::{debug, info};

use crate::catalog::models::{ArtistRecord, LocationFacts, LocationIndexPayload, RelationPayload};
use crate::enrichment::relation_cache::RelationSource;
use crate::error::FetchError;
use crate::http_client::{join_url, ServiceClient};

/// Blocking client for the fixed catalog endpoints.
#[derive(Clone)]
pub struct CatalogClient {
    http: ServiceClient,
    base_url: String,
}

impl CatalogClient {
    pub fn new(http: ServiceClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Fetches the full catalog once. No retry; callers treat failure as fatal.
    pub fn fetch_all(&self) -> Result<Vec<ArtistRecord>, FetchError> {
        let url = join_url(&self.base_url, "artists");
        let artists: Vec<ArtistRecord> = self.http.get_json(&url)?;
        info!("Catalog fetched: {} artists", artists.len());
        Ok(artists)
    }

    /// Fetches the bulk `id → [locationKey]` index used by location filters.
    pub fn fetch_location_index(&self) -> Result<HashMap<u32, Vec<String>>, FetchError> {
        let url = join_url(&self.base_url, "locations");
        let payload: LocationIndexPayload = self.http.get_json(&url)?;
        let index = payload.into_map();
        debug!("Location index fetched: {} entries", index.len());
        Ok(index)
    }

    /// Fetches the concert facts for one artist, bypassing any cache.
    pub fn fetch_relation(&self, artist_id: u32) -> Result<LocationFacts, FetchError> {
        let url = join_url(&self.base_url, &format!("relation/{artist_id}"));
        let payload: RelationPayload = self.http.get_json(&url)?;
        Ok(payload.dates_locations)
    }
}

impl RelationSource for CatalogClient {
    fn fetch_relation(&self, artist_id: u32) -> Result<LocationFacts, FetchError> {
        CatalogClient::fetch_relation(self, artist_id)
    }
}
