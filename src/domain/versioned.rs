//! Versioned entity convention.
//!
//! Every mutable resource carries a `version` that starts at 1 on creation
//! and grows by exactly one on each successful update. Writes carry the
//! version the caller last observed and are rejected when it no longer
//! matches the stored one.

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Version number assigned to a freshly inserted entity.
pub const INITIAL_VERSION: i32 = 1;

/// A resource subject to optimistic concurrency control.
pub trait VersionedEntity: Clone + Debug + Send + Sync + 'static {
    /// Stable identity, immutable after creation.
    type Id: Copy + Eq + Ord + Hash + Display + Debug + Send + Sync + 'static;

    /// Fields supplied on insert.
    type Draft: Clone + Debug + Send + Sync + 'static;

    /// Partial change set. Absent fields leave stored values untouched.
    type Changes: Clone + Debug + Send + Sync + 'static;

    /// Human readable kind used in error messages and logs.
    const KIND: &'static str;

    /// Returns the entity identity.
    fn id(&self) -> Self::Id;

    /// Returns the version this copy was read at.
    fn version(&self) -> i32;

    /// Applies the present fields of `changes` and moves to `version`.
    fn apply(&mut self, changes: &Self::Changes, version: i32);
}
