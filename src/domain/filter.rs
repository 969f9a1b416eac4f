//! Listing filters, sorting and pagination metadata for movie queries.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::Serialize;

use super::movie::Movie;

// =============================================================================
// Sorting
// =============================================================================

/// Column a movie listing can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Id,
    Title,
    Year,
    Runtime,
}

impl SortField {
    /// Returns the database column for this field.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::Year => "year",
            Self::Runtime => "runtime",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    /// Returns the SQL keyword for this direction.
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Requested sort order, parsed from the safelisted `sort` parameter.
///
/// A leading `-` selects descending order, e.g. `-year`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortOrder {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortOrder {
    /// Accepted values for the `sort` parameter.
    pub const SAFELIST: [&'static str; 8] = [
        "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
    ];

    /// Compares two movies in this order, breaking ties on id ascending.
    #[must_use]
    pub fn compare(&self, left: &Movie, right: &Movie) -> Ordering {
        let ordering = match self.field {
            SortField::Id => left.id.cmp(&right.id),
            SortField::Title => left.title.cmp(&right.title),
            SortField::Year => left.year.cmp(&right.year),
            SortField::Runtime => left.runtime.cmp(&right.runtime),
        };
        let ordering = match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        ordering.then_with(|| left.id.cmp(&right.id))
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (direction, name) = value.strip_prefix('-').map_or(
            (SortDirection::Ascending, value),
            |name| (SortDirection::Descending, name),
        );
        let field = match name {
            "id" => SortField::Id,
            "title" => SortField::Title,
            "year" => SortField::Year,
            "runtime" => SortField::Runtime,
            _ => return Err(value.to_string()),
        };
        Ok(Self { field, direction })
    }
}

// =============================================================================
// Filters
// =============================================================================

/// A single rejected filter parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterViolation {
    pub field: &'static str,
    pub message: &'static str,
}

/// Validated pagination and sort parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filters {
    pub page: u32,
    pub page_size: u32,
    pub sort: SortOrder,
}

impl Filters {
    pub const MAX_PAGE: u32 = 10_000_000;
    pub const MAX_PAGE_SIZE: u32 = 100;
    pub const DEFAULT_PAGE_SIZE: u32 = 20;

    /// Validates raw pagination and sort parameters.
    ///
    /// # Errors
    ///
    /// Returns every violation found, not just the first.
    pub fn parse(
        page: Option<i64>,
        page_size: Option<i64>,
        sort: Option<&str>,
    ) -> Result<Self, Vec<FilterViolation>> {
        let mut violations = Vec::new();

        let page = page.unwrap_or(1);
        if page <= 0 {
            violations.push(FilterViolation {
                field: "page",
                message: "must be greater than zero",
            });
        } else if page > i64::from(Self::MAX_PAGE) {
            violations.push(FilterViolation {
                field: "page",
                message: "must be a maximum of 10 million",
            });
        }

        let page_size = page_size.unwrap_or_else(|| i64::from(Self::DEFAULT_PAGE_SIZE));
        if page_size <= 0 {
            violations.push(FilterViolation {
                field: "page_size",
                message: "must be greater than zero",
            });
        } else if page_size > i64::from(Self::MAX_PAGE_SIZE) {
            violations.push(FilterViolation {
                field: "page_size",
                message: "must be a maximum of 100",
            });
        }

        let sort = match sort.map(str::parse::<SortOrder>) {
            None => SortOrder::default(),
            Some(Ok(order)) => order,
            Some(Err(_)) => {
                violations.push(FilterViolation {
                    field: "sort",
                    message: "invalid sort value",
                });
                SortOrder::default()
            }
        };

        match (u32::try_from(page), u32::try_from(page_size)) {
            (Ok(page), Ok(page_size)) if violations.is_empty() => Ok(Self {
                page,
                page_size,
                sort,
            }),
            _ => Err(violations),
        }
    }

    /// Number of rows to skip.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64).saturating_sub(1) * self.page_size as u64
    }

    /// Maximum number of rows to return.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.page_size
    }
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: Self::DEFAULT_PAGE_SIZE,
            sort: SortOrder::default(),
        }
    }
}

/// Full movie listing query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieQuery {
    /// Words that must all appear in the title.
    pub title: Option<String>,
    /// Genres that must all be attached to the movie.
    pub genres: Vec<String>,
    pub filters: Filters,
}

impl MovieQuery {
    /// Returns true if `movie` satisfies the title and genre filters.
    #[must_use]
    pub fn matches(&self, movie: &Movie) -> bool {
        self.title
            .as_deref()
            .is_none_or(|title| movie.title_matches(title))
            && movie.has_genres(&self.genres)
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Pagination summary returned alongside a listing.
///
/// All fields are zero (and omitted from JSON) when nothing matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: u64,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

impl Metadata {
    /// Builds the metadata for `total_records` matches.
    #[must_use]
    pub fn calculate(total_records: u64, filters: &Filters) -> Self {
        if total_records == 0 {
            return Self::default();
        }
        Self {
            current_page: filters.page,
            page_size: filters.page_size,
            first_page: 1,
            last_page: total_records.div_ceil(u64::from(filters.page_size)),
            total_records,
        }
    }
}
