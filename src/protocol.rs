//! Event-bus protocol between worker threads and the coordinating thread.
//!
//! Workers only ever hold a bus sender; every payload here is a finished,
//! immutable result that the session applies on its own thread.

use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::models::GeoCoordinate;
use crate::error::FetchErrorKind;

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Catalog(CatalogMessage),
    Enrichment(EnrichmentMessage),
}

/// Catalog-domain notifications.
#[derive(Debug, Clone)]
pub enum CatalogMessage {
    /// Bulk `id → [locationKey]` index finished downloading.
    LocationIndexFetched(Arc<HashMap<u32, Vec<String>>>),
    LocationIndexFailed(FetchErrorKind),
}

/// Identifies one attachment of a detail view.
///
/// A new ticket is issued on every attach, so results from an earlier visit
/// to the same artist are distinguishable from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DetailTicket {
    pub artist_id: u32,
    pub generation: u64,
}

/// One concert location of the attached artist, before enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationSummary {
    pub location_key: String,
    pub label: String,
    /// Free-text place query sent to the geocoder.
    pub geocode_query: String,
    pub dates: Vec<String>,
}

/// Terminal enrichment outcome for one location.
///
/// Success carries `coordinate` and `tile_bytes`. A geocoding failure carries
/// only `error_kind`; a tile failure keeps the resolved `coordinate`.
#[derive(Debug, Clone)]
pub struct LocationEnrichment {
    pub ticket: DetailTicket,
    pub location_key: String,
    pub label: String,
    pub coordinate: Option<GeoCoordinate>,
    pub tile_bytes: Option<Arc<[u8]>>,
    pub error_kind: Option<FetchErrorKind>,
}

impl LocationEnrichment {
    pub fn is_success(&self) -> bool {
        self.error_kind.is_none() && self.tile_bytes.is_some()
    }
}

/// Enrichment-domain notifications for the attached detail view.
#[derive(Debug, Clone)]
pub enum EnrichmentMessage {
    RelationLoaded {
        ticket: DetailTicket,
        locations: Vec<LocationSummary>,
        concert_count: usize,
    },
    RelationFailed {
        ticket: DetailTicket,
        error_kind: FetchErrorKind,
    },
    LocationEnriched(LocationEnrichment),
}

impl EnrichmentMessage {
    pub fn ticket(&self) -> DetailTicket {
        match self {
            Self::RelationLoaded { ticket, .. } | Self::RelationFailed { ticket, .. } => *ticket,
            Self::LocationEnriched(outcome) => outcome.ticket,
        }
    }
}
