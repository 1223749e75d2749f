//! Parsing for user-created artists entered through the manual-entry form.

use crate::catalog::models::LocationFacts;

pub const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/300x300.png?text=Band";
pub const DEFAULT_FIRST_RELEASE: &str = "01-01-2000";

/// A user-created artist before it receives an id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewArtistDraft {
    pub name: String,
    pub image_ref: String,
    pub members: Vec<String>,
    pub creation_year: i32,
    pub first_release_date: String,
    pub spotify_link: Option<String>,
    pub youtube_link: Option<String>,
    pub deezer_link: Option<String>,
    pub concerts: LocationFacts,
}

/// Raw text of the entry form fields.
#[derive(Debug, Clone, Default)]
pub struct ArtistFormFields {
    pub name: String,
    pub image_ref: String,
    pub members: String,
    pub creation_year: String,
    pub first_release_date: String,
    pub spotify_link: String,
    pub youtube_link: String,
    pub deezer_link: String,
    /// One `City - date | date` line per location.
    pub concerts: String,
}

fn optional_link(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl NewArtistDraft {
    pub fn from_form(fields: &ArtistFormFields) -> Self {
        Self {
            name: fields.name.trim().to_string(),
            image_ref: fields.image_ref.trim().to_string(),
            members: split_members(&fields.members),
            creation_year: parse_year(&fields.creation_year),
            first_release_date: fields.first_release_date.trim().to_string(),
            spotify_link: optional_link(&fields.spotify_link),
            youtube_link: optional_link(&fields.youtube_link),
            deezer_link: optional_link(&fields.deezer_link),
            concerts: parse_concert_lines(&fields.concerts),
        }
    }
}

/// Comma-separated names, blanks dropped.
pub fn split_members(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lenient year; anything invalid or negative is 0.
pub fn parse_year(text: &str) -> i32 {
    match text.trim().parse::<i32>() {
        Ok(year) if year >= 0 => year,
        _ => 0,
    }
}

/// Parses `City - d1 | d2` lines. Lines without a city or any date are skipped.
pub fn parse_concert_lines(text: &str) -> LocationFacts {
    let mut concerts = LocationFacts::new();
    for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((city, dates_raw)) = line.split_once('-') else {
            continue;
        };
        let city = city.trim();
        let dates: Vec<String> = dates_raw
            .split('|')
            .map(str::trim)
            .filter(|date| !date.is_empty())
            .map(str::to_string)
            .collect();
        if !city.is_empty() && !dates.is_empty() {
            concerts.insert(city.to_string(), dates);
        }
    }
    concerts
}
