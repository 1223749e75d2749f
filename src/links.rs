//! Outbound link helpers for streaming services and map pages.

use crate::catalog::models::{ArtistRecord, GeoCoordinate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingService {
    Spotify,
    YouTube,
    Deezer,
}

impl StreamingService {
    pub const ALL: [StreamingService; 3] = [Self::Spotify, Self::YouTube, Self::Deezer];

    pub fn label(self) -> &'static str {
        match self {
            Self::Spotify => "Spotify",
            Self::YouTube => "YouTube",
            Self::Deezer => "Deezer",
        }
    }

    fn search_url(self, name: &str) -> String {
        let encoded = urlencoding::encode(name.trim());
        match self {
            Self::Spotify => format!("https://open.spotify.com/search/{encoded}"),
            Self::YouTube => format!("https://www.youtube.com/results?search_query={encoded}"),
            Self::Deezer => format!("https://www.deezer.com/search/{encoded}"),
        }
    }

    fn own_link(self, artist: &ArtistRecord) -> Option<&str> {
        let link = match self {
            Self::Spotify => artist.spotify_link.as_deref(),
            Self::YouTube => artist.youtube_link.as_deref(),
            Self::Deezer => artist.deezer_link.as_deref(),
        }?;
        let link = link.trim();
        (!link.is_empty()).then_some(link)
    }
}

/// The artist's own link for `service`, or a name search on it.
pub fn streaming_url(artist: &ArtistRecord, service: StreamingService) -> String {
    service
        .own_link(artist)
        .map(str::to_string)
        .unwrap_or_else(|| service.search_url(&artist.name))
}

/// OpenStreetMap page centered on a resolved coordinate.
pub fn osm_marker_url(coordinate: GeoCoordinate) -> String {
    format!(
        "https://www.openstreetmap.org/?mlat={}&mlon={}",
        coordinate.lat, coordinate.lon
    )
}

/// OpenStreetMap search for a location label, used while no coordinate is known.
pub fn osm_search_url(label: &str) -> String {
    format!(
        "https://www.openstreetmap.org/search?query={}",
        urlencoding::encode(label.trim())
    )
}
