//! Domain module for the movie catalogue.
//!
//! This module contains the domain models, the versioned entity convention
//! shared by all mutable resources, and listing filters.

pub mod filter;
pub mod movie;
pub mod user;
pub mod versioned;

pub use filter::{
    FilterViolation, Filters, Metadata, MovieQuery, SortDirection, SortField, SortOrder,
};
pub use movie::{InvalidRuntimeFormat, Movie, MovieChanges, MovieId, NewMovie, Runtime};
pub use user::{
    DEFAULT_PASSWORD_COST, MAX_PASSWORD_COST, MIN_PASSWORD_COST, NewUser, PasswordHash,
    PasswordHashError, User, UserChanges, UserId,
};
pub use versioned::{INITIAL_VERSION, VersionedEntity};
