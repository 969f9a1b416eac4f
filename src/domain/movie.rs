//! Movie domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::versioned::{INITIAL_VERSION, VersionedEntity};

// =============================================================================
// Value Objects
// =============================================================================

/// Unique identifier for a movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieId(i64);

impl MovieId {
    /// Wraps a raw identifier.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for MovieId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Movie runtime in minutes.
///
/// Serialised as a string such as `"102 mins"`, which is also the only
/// accepted input form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Runtime(i32);

/// Invalid runtime string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid runtime format, expected \"<minutes> mins\"")]
pub struct InvalidRuntimeFormat;

impl Runtime {
    /// Wraps a number of minutes.
    #[must_use]
    pub const fn from_minutes(minutes: i32) -> Self {
        Self(minutes)
    }

    /// Returns the number of minutes.
    #[must_use]
    pub const fn minutes(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 1 {
            write!(formatter, "1 min")
        } else {
            write!(formatter, "{} mins", self.0)
        }
    }
}

impl FromStr for Runtime {
    type Err = InvalidRuntimeFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (number, unit) = value
            .trim()
            .split_once(' ')
            .ok_or(InvalidRuntimeFormat)?;
        if unit != "mins" && unit != "min" {
            return Err(InvalidRuntimeFormat);
        }
        number
            .parse::<i32>()
            .map(Self)
            .map_err(|_| InvalidRuntimeFormat)
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Movie
// =============================================================================

/// A catalogued movie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movie {
    pub id: MovieId,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i32,
}

impl Movie {
    /// Materialises a newly inserted movie at the initial version.
    #[must_use]
    pub fn from_new(id: MovieId, created_at: DateTime<Utc>, new: NewMovie) -> Self {
        Self {
            id,
            created_at,
            title: new.title,
            year: new.year,
            runtime: new.runtime,
            genres: new.genres,
            version: INITIAL_VERSION,
        }
    }

    /// Returns true when every genre in `genres` is attached to this movie.
    #[must_use]
    pub fn has_genres(&self, genres: &[String]) -> bool {
        genres.iter().all(|genre| self.genres.contains(genre))
    }

    /// Returns true when every word of `query` appears in the title,
    /// ignoring case. An empty query matches everything.
    #[must_use]
    pub fn title_matches(&self, query: &str) -> bool {
        let title = self.title.to_lowercase();
        let words: Vec<&str> = title.split_whitespace().collect();
        query
            .to_lowercase()
            .split_whitespace()
            .all(|needle| words.contains(&needle))
    }
}

/// Fields supplied when creating a movie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovie {
    pub title: String,
    pub year: i32,
    pub runtime: Runtime,
    pub genres: Vec<String>,
}

/// Partial update of a movie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieChanges {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

impl MovieChanges {
    /// Returns true if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.year.is_none() && self.runtime.is_none() && self.genres.is_none()
    }
}

impl VersionedEntity for Movie {
    type Id = MovieId;
    type Draft = NewMovie;
    type Changes = MovieChanges;

    const KIND: &'static str = "movie";

    fn id(&self) -> MovieId {
        self.id
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn apply(&mut self, changes: &MovieChanges, version: i32) {
        if let Some(title) = &changes.title {
            self.title.clone_from(title);
        }
        if let Some(year) = changes.year {
            self.year = year;
        }
        if let Some(runtime) = changes.runtime {
            self.runtime = runtime;
        }
        if let Some(genres) = &changes.genres {
            self.genres.clone_from(genres);
        }
        self.version = version;
    }
}
