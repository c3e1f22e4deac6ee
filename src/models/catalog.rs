//! Catalog tree reconstructed from flat bucket keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Separator between key segments.
pub const PATH_SEPARATOR: char = '/';

/// Any key segment starting with this marker is hidden from the catalog.
pub const HIDDEN_MARKER: char = '.';

/// Top-level prefix reserved for files written by the sync engine.
pub const SYSTEM_PREFIX: &str = "streamhub/";

/// Season label used when a series folder holds episodes directly.
pub const FLAT_SEASON_LABEL: &str = "Episodes";

/// Season label used for every entry of a movie bucket.
pub const MOVIE_SEASON_LABEL: &str = "Movie";

/// How keys are grouped into series and seasons.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BucketMode {
    /// `Series/Season/Episode` or `Series/Episode`.
    Hierarchical,
    /// One catalog series per file.
    Flat,
}

/// Bucket variant chosen by the caller when connecting.
///
/// The variant cannot be derived from bucket contents. Deserialization goes
/// through `FromStr`, so JSON bodies accept the same spellings as the CLI.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum BucketKind {
    Series,
    Anime,
    Movie,
}

impl BucketKind {
    pub fn mode(self) -> BucketMode {
        match self {
            BucketKind::Series | BucketKind::Anime => BucketMode::Hierarchical,
            BucketKind::Movie => BucketMode::Flat,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BucketKind::Series => "series",
            BucketKind::Anime => "anime",
            BucketKind::Movie => "movie",
        }
    }
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBucketKind(pub String);

impl fmt::Display for UnknownBucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown bucket kind `{}` (expected series, anime or movie)",
            self.0
        )
    }
}

impl std::error::Error for UnknownBucketKind {}

impl TryFrom<String> for BucketKind {
    type Error = UnknownBucketKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for BucketKind {
    type Err = UnknownBucketKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "series" => Ok(BucketKind::Series),
            "anime" | "animecdn" => Ok(BucketKind::Anime),
            "movie" | "movies" => Ok(BucketKind::Movie),
            _ => Err(UnknownBucketKind(value.to_string())),
        }
    }
}

/// A playable item placed in the catalog.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Display name; also the episode component of a progress key.
    pub name: String,

    /// Full object key in the bucket.
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    pub last_modified: DateTime<Utc>,

    /// True when the entry is a single-file movie.
    pub is_movie: bool,
}

/// Series name -> season name -> entries.
///
/// Entries keep listing order; use the sorted accessors for display.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Catalog {
    series: BTreeMap<String, BTreeMap<String, Vec<CatalogEntry>>>,
}

impl Catalog {
    /// Returns an empty catalog.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Append an entry, creating its series and season as needed.
    pub fn insert(&mut self, series: String, season: String, entry: CatalogEntry) {
        self.series
            .entry(series)
            .or_default()
            .entry(season)
            .or_default()
            .push(entry);
    }

    /// Series names in plain byte order.
    pub fn series_names(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Total number of entries across all series and seasons.
    pub fn entry_count(&self) -> usize {
        self.series
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn seasons(&self, series: &str) -> Option<&BTreeMap<String, Vec<CatalogEntry>>> {
        self.series.get(series)
    }

    pub fn entries(&self, series: &str, season: &str) -> Option<&[CatalogEntry]> {
        self.series
            .get(series)
            .and_then(|seasons| seasons.get(season))
            .map(Vec::as_slice)
    }

    pub fn entry(&self, series: &str, season: &str, name: &str) -> Option<&CatalogEntry> {
        self.entries(series, season)?
            .iter()
            .find(|entry| entry.name == name)
    }

    /// Series names containing `term`, ignoring case. An empty term matches all.
    pub fn search(&self, term: &str) -> Vec<&str> {
        let needle = term.trim().to_lowercase();
        self.series_names()
            .filter(|name| needle.is_empty() || name.to_lowercase().contains(&needle))
            .collect()
    }
}
