//! Catalog payloads and the value types derived from them.

use std::collections::{BTreeMap, HashMap};

/// One musical act from the catalog service or from local user input.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ArtistRecord {
    pub id: u32,
    pub name: String,
    #[serde(rename = "image", default)]
    pub image_ref: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(rename = "creationDate", default)]
    pub creation_year: i32,
    /// Free text, nominally `dd-mm-yyyy`.
    #[serde(rename = "firstAlbum", default)]
    pub first_release_date: String,
    #[serde(rename = "spotifyLink", default, skip_serializing_if = "Option::is_none")]
    pub spotify_link: Option<String>,
    #[serde(rename = "youtubeLink", default, skip_serializing_if = "Option::is_none")]
    pub youtube_link: Option<String>,
    #[serde(rename = "deezerLink", default, skip_serializing_if = "Option::is_none")]
    pub deezer_link: Option<String>,
}

impl ArtistRecord {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

/// Concert location key → ordered performance dates, for one artist.
pub type LocationFacts = BTreeMap<String, Vec<String>>;

/// `GET /relation/{id}` body.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct RelationPayload {
    pub id: u32,
    #[serde(rename = "datesLocations", default)]
    pub dates_locations: LocationFacts,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct LocationIndexEntry {
    pub id: u32,
    #[serde(default)]
    pub locations: Vec<String>,
}

/// `GET /locations` body.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct LocationIndexPayload {
    #[serde(default)]
    pub index: Vec<LocationIndexEntry>,
}

impl LocationIndexPayload {
    pub fn into_map(self) -> HashMap<u32, Vec<String>> {
        self.index
            .into_iter()
            .map(|entry| (entry.id, entry.locations))
            .collect()
    }
}

/// Decimal-degree position returned by the geocoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoCoordinate {
    pub lat: f64,
    pub lon: f64,
}

fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Turns a location key into a display label.
///
/// `_` separates place segments and `-` joins the words inside a segment:
/// `san-francisco_ca` becomes `San Francisco, Ca`.
pub fn format_location_key(key: &str) -> String {
    key.split('_')
        .map(|segment| {
            segment
                .split(|c: char| c == '-' || c.is_whitespace())
                .filter(|word| !word.is_empty())
                .map(capitalize_first)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Turns a location key into the place query sent to the geocoder.
///
/// Catalog keys put `-` between city and country and `_` between the words
/// of a name: `los_angeles-usa` becomes `Los Angeles, Usa`.
pub fn geocode_query(key: &str) -> String {
    key.split('-')
        .map(|segment| {
            segment
                .split(|c: char| c == '_' || c.is_whitespace())
                .filter(|word| !word.is_empty())
                .map(capitalize_first)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Lowercased, separator-free form of a location key used for substring matching.
pub fn searchable_location_key(key: &str) -> String {
    key.replace(['-', '_'], " ").to_lowercase()
}

/// Total number of performance dates across all locations.
pub fn concert_count(facts: &LocationFacts) -> usize {
    facts.values().map(Vec::len).sum()
}
