//! In-memory filter/sort/search over the catalog.
//!
//! Every query recomputes the full view; catalogs of a few thousand entries
//! stay well under a frame. The auxiliary location index is filled in once the
//! bulk location download lands; until then location filters match nothing.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDate;
use log::debug;

use crate::catalog::local_entry::{NewArtistDraft, DEFAULT_FIRST_RELEASE, PLACEHOLDER_IMAGE};
use crate::catalog::models::{searchable_location_key, ArtistRecord};
use crate::favorites_store::FavoritesStore;

const RELEASE_DATE_FORMAT: &str = "%d-%m-%Y";

/// Ordering applied to query results. Ties keep catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    NameAsc,
    NameDesc,
    CreationYearAsc,
    CreationYearDesc,
    FirstReleaseAsc,
    FirstReleaseDesc,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "name" | "name-asc" => Ok(Self::NameAsc),
            "name-desc" => Ok(Self::NameDesc),
            "creation" | "creation-asc" => Ok(Self::CreationYearAsc),
            "creation-desc" => Ok(Self::CreationYearDesc),
            "first-release" | "first-release-asc" => Ok(Self::FirstReleaseAsc),
            "first-release-desc" => Ok(Self::FirstReleaseDesc),
            other => Err(format!("unknown sort key '{other}'")),
        }
    }
}

/// Member-count filter bucket; `EightOrMore` is the open-ended "8+".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemberBucket {
    Exactly(u8),
    EightOrMore,
}

impl MemberBucket {
    pub fn matches(self, member_count: usize) -> bool {
        match self {
            Self::Exactly(count) => member_count == usize::from(count),
            Self::EightOrMore => member_count >= 8,
        }
    }
}

impl FromStr for MemberBucket {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "8+" => Ok(Self::EightOrMore),
            other => match other.parse::<u8>() {
                Ok(count @ 1..=7) => Ok(Self::Exactly(count)),
                _ => Err(format!("unknown member bucket '{other}'")),
            },
        }
    }
}

/// Inclusive year bounds; a missing bound is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct YearRange {
    pub min: Option<i32>,
    pub max: Option<i32>,
}

impl YearRange {
    pub fn between(min: i32, max: i32) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, year: i32) -> bool {
        self.min.map_or(true, |min| year >= min) && self.max.map_or(true, |max| year <= max)
    }
}

/// Combined filter and sort request. Active criteria are ANDed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryCriteria {
    /// Case-insensitive substring of the name or of any member.
    pub search: String,
    pub creation_years: YearRange,
    pub first_release_years: YearRange,
    /// Empty means no member-count filter.
    pub member_buckets: BTreeSet<MemberBucket>,
    pub favorites_only: bool,
    /// Case-insensitive substring of any indexed location.
    pub location: String,
    pub sort: SortKey,
}

impl QueryCriteria {
    pub fn is_location_filtered(&self) -> bool {
        !self.location.trim().is_empty()
    }
}

/// Year taken from the last four characters of a free-text date; 0 if unparsable.
pub fn first_release_year(date: &str) -> i32 {
    let date = date.trim();
    let Some((start, _)) = date.char_indices().rev().nth(3) else {
        return 0;
    };
    date[start..].parse::<i32>().unwrap_or(0)
}

/// Chronological key for a `dd-mm-yyyy` date; unparsable dates sort first.
pub fn release_date_key(date: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date.trim(), RELEASE_DATE_FORMAT).unwrap_or(NaiveDate::MIN)
}

fn matches_first_release(range: &YearRange, date: &str) -> bool {
    if range.is_unbounded() {
        return true;
    }
    let year = first_release_year(date);
    year != 0 && range.contains(year)
}

fn matches_search(artist: &ArtistRecord, needle: &str) -> bool {
    artist.name.to_lowercase().contains(needle)
        || artist
            .members
            .iter()
            .any(|member| member.to_lowercase().contains(needle))
}

fn compare(sort: SortKey, left: &ArtistRecord, right: &ArtistRecord) -> Ordering {
    match sort {
        SortKey::NameAsc => left.name.to_lowercase().cmp(&right.name.to_lowercase()),
        SortKey::NameDesc => right.name.to_lowercase().cmp(&left.name.to_lowercase()),
        SortKey::CreationYearAsc => left.creation_year.cmp(&right.creation_year),
        SortKey::CreationYearDesc => right.creation_year.cmp(&left.creation_year),
        SortKey::FirstReleaseAsc => release_date_key(&left.first_release_date)
            .cmp(&release_date_key(&right.first_release_date)),
        SortKey::FirstReleaseDesc => release_date_key(&right.first_release_date)
            .cmp(&release_date_key(&left.first_release_date)),
    }
}

/// Catalog plus the asynchronously merged `id → locations` index.
pub struct QueryEngine {
    catalog: RwLock<Vec<ArtistRecord>>,
    /// Searchable (lowercased, separator-free) location keys per artist.
    location_index: RwLock<HashMap<u32, Vec<String>>>,
    favorites: Arc<FavoritesStore>,
}

impl QueryEngine {
    pub fn new(catalog: Vec<ArtistRecord>, favorites: Arc<FavoritesStore>) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            location_index: RwLock::new(HashMap::new()),
            favorites,
        }
    }

    pub fn favorites(&self) -> &Arc<FavoritesStore> {
        &self.favorites
    }

    pub fn len(&self) -> usize {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn artist(&self, artist_id: u32) -> Option<ArtistRecord> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|artist| artist.id == artist_id)
            .cloned()
    }

    pub fn has_location_index_for(&self, artist_id: u32) -> bool {
        self.location_index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&artist_id)
    }

    /// Merges a downloaded location index; later entries replace earlier ones per id.
    pub fn merge_location_index(&self, index: &HashMap<u32, Vec<String>>) {
        let mut merged = self
            .location_index
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for (artist_id, keys) in index {
            merged.insert(
                *artist_id,
                keys.iter().map(|key| searchable_location_key(key)).collect(),
            );
        }
        debug!("Location index merged: {} artists indexed", merged.len());
    }

    /// Appends a user-created artist with the next free id.
    pub fn add_local_artist(&self, draft: NewArtistDraft) -> ArtistRecord {
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        let id = catalog
            .iter()
            .map(|artist| artist.id)
            .max()
            .map_or(1, |max_id| max_id + 1);
        let record = ArtistRecord {
            id,
            name: draft.name,
            image_ref: if draft.image_ref.trim().is_empty() {
                PLACEHOLDER_IMAGE.to_string()
            } else {
                draft.image_ref
            },
            members: draft.members,
            creation_year: draft.creation_year,
            first_release_date: if draft.first_release_date.trim().is_empty() {
                DEFAULT_FIRST_RELEASE.to_string()
            } else {
                draft.first_release_date
            },
            spotify_link: draft.spotify_link,
            youtube_link: draft.youtube_link,
            deezer_link: draft.deezer_link,
        };
        catalog.push(record.clone());
        drop(catalog);

        self.location_index
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                draft
                    .concerts
                    .keys()
                    .map(|key| searchable_location_key(key))
                    .collect(),
            );
        record
    }

    /// Filtered and sorted view of the catalog.
    pub fn query(&self, criteria: &QueryCriteria) -> Vec<ArtistRecord> {
        let needle = criteria.search.trim().to_lowercase();
        let location_needle = criteria.location.trim().to_lowercase();
        let favorites = criteria.favorites_only.then(|| self.favorites.snapshot());
        let index = self
            .location_index
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);

        let mut results: Vec<ArtistRecord> = catalog
            .iter()
            .filter(|artist| {
                favorites
                    .as_ref()
                    .map_or(true, |favorites| favorites.contains(&artist.id))
            })
            .filter(|artist| needle.is_empty() || matches_search(artist, &needle))
            .filter(|artist| criteria.creation_years.contains(artist.creation_year))
            .filter(|artist| {
                matches_first_release(&criteria.first_release_years, &artist.first_release_date)
            })
            .filter(|artist| {
                criteria.member_buckets.is_empty()
                    || criteria
                        .member_buckets
                        .iter()
                        .any(|bucket| bucket.matches(artist.member_count()))
            })
            .filter(|artist| {
                location_needle.is_empty()
                    || index.get(&artist.id).is_some_and(|keys| {
                        keys.iter().any(|key| key.contains(&location_needle))
                    })
            })
            .cloned()
            .collect();

        results.sort_by(|left, right| compare(criteria.sort, left, right));
        results
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Arc;

    use super::{
        first_release_year, release_date_key, MemberBucket, QueryCriteria, QueryEngine,
        SortKey, YearRange,
    };
    use crate::catalog::local_entry::{NewArtistDraft, DEFAULT_FIRST_RELEASE, PLACEHOLDER_IMAGE};
    use crate::catalog::models::{ArtistRecord, LocationFacts};
    use crate::favorites_store::FavoritesStore;

    fn artist(id: u32, name: &str, members: usize, year: i32, first: &str) -> ArtistRecord {
        ArtistRecord {
            id,
            name: name.to_string(),
            image_ref: String::new(),
            members: (0..members).map(|index| format!("{name} member {index}")).collect(),
            creation_year: year,
            first_release_date: first.to_string(),
            spotify_link: None,
            youtube_link: None,
            deezer_link: None,
        }
    }

    fn engine_with(catalog: Vec<ArtistRecord>) -> (QueryEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let favorites = Arc::new(FavoritesStore::open(dir.path().join("favorites.json")));
        (QueryEngine::new(catalog, favorites), dir)
    }

    fn ids(results: &[ArtistRecord]) -> Vec<u32> {
        results.iter().map(|artist| artist.id).collect()
    }

    fn sample_catalog() -> Vec<ArtistRecord> {
        vec![
            artist(1, "queen", 4, 1970, "14-12-1973"),
            artist(2, "Arctic Monkeys", 4, 2002, "23-01-2006"),
            artist(3, "Wu-Tang Clan", 9, 1992, "09-11-1993"),
            artist(4, "Pink Floyd", 5, 1965, "05-08-1967"),
            artist(5, "Gorillaz", 7, 1998, "unknown"),
        ]
    }

    #[test]
    fn test_no_criteria_returns_everything_by_name_ignoring_case() {
        let (engine, _dir) = engine_with(sample_catalog());
        let results = engine.query(&QueryCriteria::default());
        assert_eq!(ids(&results), vec![2, 5, 4, 1, 3]);
    }

    #[test]
    fn test_identical_criteria_give_identical_results() {
        let (engine, _dir) = engine_with(sample_catalog());
        let criteria = QueryCriteria {
            search: "o".to_string(),
            sort: SortKey::CreationYearDesc,
            ..QueryCriteria::default()
        };
        assert_eq!(engine.query(&criteria), engine.query(&criteria));
    }

    #[test]
    fn test_search_matches_name_or_any_member() {
        let mut catalog = sample_catalog();
        catalog[0].members = vec!["Freddie Mercury".to_string()];
        let (engine, _dir) = engine_with(catalog);
        let by_member = QueryCriteria {
            search: "MERCURY".to_string(),
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&by_member)), vec![1]);
        let by_name = QueryCriteria {
            search: "floyd".to_string(),
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&by_name)), vec![4]);
    }

    #[test]
    fn test_padded_needles_are_trimmed() {
        let (engine, _dir) = engine_with(sample_catalog());
        let padded = QueryCriteria {
            search: "  floyd ".to_string(),
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&padded)), vec![4]);
        let blank = QueryCriteria {
            search: "   ".to_string(),
            location: " ".to_string(),
            ..QueryCriteria::default()
        };
        assert!(!blank.is_location_filtered());
        assert_eq!(engine.query(&blank).len(), 5);
    }

    #[test]
    fn test_creation_year_range_is_inclusive() {
        let (engine, _dir) = engine_with(sample_catalog());
        let criteria = QueryCriteria {
            creation_years: YearRange::between(1970, 1992),
            sort: SortKey::CreationYearAsc,
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&criteria)), vec![1, 3]);
    }

    #[test]
    fn test_first_release_range_excludes_unparsable_dates_only_when_bounded() {
        let (engine, _dir) = engine_with(sample_catalog());
        let bounded = QueryCriteria {
            first_release_years: YearRange {
                min: None,
                max: Some(1990),
            },
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&bounded)), vec![4, 1]);
        assert_eq!(engine.query(&QueryCriteria::default()).len(), 5);
    }

    #[test]
    fn test_eight_plus_bucket_includes_nine_excludes_seven() {
        let (engine, _dir) = engine_with(sample_catalog());
        let criteria = QueryCriteria {
            member_buckets: BTreeSet::from([MemberBucket::EightOrMore]),
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&criteria)), vec![3]);

        let mixed = QueryCriteria {
            member_buckets: BTreeSet::from([MemberBucket::Exactly(7), MemberBucket::Exactly(5)]),
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&mixed)), vec![5, 4]);
    }

    #[test]
    fn test_favorites_only_consults_the_store() {
        let (engine, _dir) = engine_with(sample_catalog());
        engine.favorites().toggle(4);
        engine.favorites().toggle(2);
        let criteria = QueryCriteria {
            favorites_only: true,
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&criteria)), vec![2, 4]);
    }

    #[test]
    fn test_location_filter_is_closed_world_until_index_merges() {
        let (engine, _dir) = engine_with(sample_catalog());
        let criteria = QueryCriteria {
            location: "new york".to_string(),
            ..QueryCriteria::default()
        };
        assert!(engine.query(&criteria).is_empty());

        engine.merge_location_index(&HashMap::from([
            (1, vec!["new_york-usa".to_string()]),
            (3, vec!["staten_island-usa".to_string(), "New_York-USA".to_string()]),
            (4, vec!["london-uk".to_string()]),
        ]));
        assert_eq!(ids(&engine.query(&criteria)), vec![1, 3]);
        assert!(!engine.has_location_index_for(2));
    }

    #[test]
    fn test_criteria_combine_with_and() {
        let (engine, _dir) = engine_with(sample_catalog());
        engine.merge_location_index(&HashMap::from([
            (2, vec!["sheffield-uk".to_string()]),
            (4, vec!["london-uk".to_string()]),
        ]));
        let criteria = QueryCriteria {
            location: "uk".to_string(),
            creation_years: YearRange {
                min: Some(2000),
                max: None,
            },
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&criteria)), vec![2]);
    }

    #[test]
    fn test_equal_creation_years_keep_catalog_order() {
        let (engine, _dir) = engine_with(vec![
            artist(10, "Zeta", 1, 1990, ""),
            artist(11, "Alpha", 1, 1985, ""),
            artist(12, "Beta", 1, 1990, ""),
        ]);
        let criteria = QueryCriteria {
            sort: SortKey::CreationYearAsc,
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&criteria)), vec![11, 10, 12]);
    }

    #[test]
    fn test_first_release_sort_is_chronological_with_unparsable_first() {
        let (engine, _dir) = engine_with(sample_catalog());
        let criteria = QueryCriteria {
            sort: SortKey::FirstReleaseAsc,
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&criteria)), vec![5, 4, 1, 3, 2]);
        let descending = QueryCriteria {
            sort: SortKey::FirstReleaseDesc,
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&descending)), vec![2, 3, 1, 4, 5]);
    }

    #[test]
    fn test_name_desc_sort() {
        let (engine, _dir) = engine_with(sample_catalog());
        let criteria = QueryCriteria {
            sort: SortKey::NameDesc,
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&criteria)), vec![3, 1, 4, 5, 2]);
    }

    #[test]
    fn test_local_artist_gets_next_id_defaults_and_indexed_locations() {
        let (engine, _dir) = engine_with(sample_catalog());
        let mut concerts = LocationFacts::new();
        concerts.insert("Le Havre".to_string(), vec!["2024-05-01".to_string()]);
        let record = engine.add_local_artist(NewArtistDraft {
            name: "Garage Band".to_string(),
            concerts,
            ..NewArtistDraft::default()
        });
        assert_eq!(record.id, 6);
        assert_eq!(record.image_ref, PLACEHOLDER_IMAGE);
        assert_eq!(record.first_release_date, DEFAULT_FIRST_RELEASE);
        assert_eq!(engine.artist(6), Some(record));

        let criteria = QueryCriteria {
            location: "havre".to_string(),
            ..QueryCriteria::default()
        };
        assert_eq!(ids(&engine.query(&criteria)), vec![6]);
    }

    #[test]
    fn test_first_release_year_reads_trailing_digits() {
        assert_eq!(first_release_year("14-12-1973"), 1973);
        assert_eq!(first_release_year("1973"), 1973);
        assert_eq!(first_release_year("73"), 0);
        assert_eq!(first_release_year("soon"), 0);
        assert!(release_date_key("31-02-2001") < release_date_key("01-01-1900"));
    }

    #[test]
    fn test_bucket_and_sort_parsing() {
        assert_eq!("8+".parse::<MemberBucket>(), Ok(MemberBucket::EightOrMore));
        assert_eq!("3".parse::<MemberBucket>(), Ok(MemberBucket::Exactly(3)));
        assert!("8".parse::<MemberBucket>().is_err());
        assert_eq!(
            "first-release-desc".parse::<SortKey>(),
            Ok(SortKey::FirstReleaseDesc)
        );
        assert!("loudness".parse::<SortKey>().is_err());
    }
}
