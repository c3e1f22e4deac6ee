//! Watch progress records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Composite primary key of a progress record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EpisodeKey {
    pub series_name: String,
    pub season: String,
    pub episode_name: String,
}

impl EpisodeKey {
    pub fn new(
        series_name: impl Into<String>,
        season: impl Into<String>,
        episode_name: impl Into<String>,
    ) -> Self {
        Self {
            series_name: series_name.into(),
            season: season.into(),
            episode_name: episode_name.into(),
        }
    }
}

/// Resume position and completion state of one episode.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProgressRecord {
    pub series_name: String,
    pub season: String,
    pub episode_name: String,

    /// Resume position in seconds.
    pub position: f64,

    /// Total duration in seconds, as reported by the player.
    pub duration: f64,

    /// Microsecond precision; finer parts are dropped on write.
    pub last_updated: DateTime<Utc>,

    pub completed: bool,
}

impl ProgressRecord {
    pub fn key(&self) -> EpisodeKey {
        EpisodeKey::new(&self.series_name, &self.season, &self.episode_name)
    }

    /// Ordering used by exports: series, then season, then episode.
    pub fn sort_key(&self) -> (&str, &str, &str) {
        (&self.series_name, &self.season, &self.episode_name)
    }
}

/// Watched counts for one season, aggregated from stored records.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SeasonProgress {
    pub season: String,
    /// Records stored for the season.
    pub tracked: u64,
    /// Records marked completed.
    pub watched: u64,
}
