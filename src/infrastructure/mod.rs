//! Infrastructure module for external services.
//!
//! This module contains the backing stores, the version-checked store on top
//! of them, background task tracking and outbound mail.

pub mod background;
pub mod factory;
pub mod guarded;
pub mod in_memory;
pub mod mailer;
pub mod postgres;
pub mod repository;

pub use background::{DrainTimeout, TaskDrain};
pub use factory::{
    ConfigurationError, FactoryError, Repositories, RepositoryFactory, StorageConfig, StorageMode,
};
pub use guarded::{ConcurrencyGuardedStore, StoreError};
pub use in_memory::{InMemoryMovieRepository, InMemoryUserRepository};
pub use mailer::{Email, HttpMailer, LogMailer, Mailer, MailerError, StubMailer};
pub use postgres::{PoolSettings, PostgresMovieRepository, PostgresUserRepository};
pub use repository::{
    ConditionalUpdate, MovieRepository, PaginatedResult, RepositoryError, VersionedStore,
};
