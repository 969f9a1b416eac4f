//! User domain model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::versioned::{INITIAL_VERSION, VersionedEntity};

/// Unique identifier for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
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

impl fmt::Display for UserId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

// =============================================================================
// Password Hash
// =============================================================================

/// bcrypt work factor used unless configured otherwise.
pub const DEFAULT_PASSWORD_COST: u32 = bcrypt::DEFAULT_COST;
/// Lowest work factor bcrypt accepts.
pub const MIN_PASSWORD_COST: u32 = 4;
/// Highest work factor bcrypt accepts.
pub const MAX_PASSWORD_COST: u32 = 31;

const BCRYPT_HASH_LENGTH: usize = 60;
const BCRYPT_PREFIXES: [&str; 4] = ["$2a$", "$2b$", "$2x$", "$2y$"];

/// Failure to produce or restore a password hash.
#[derive(Debug, Error)]
pub enum PasswordHashError {
    #[error("failed to hash password: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("stored password hash is not a bcrypt hash")]
    Malformed,
}

/// bcrypt password hash in its modular crypt form (`$2b$12$...`).
///
/// Hashing is CPU bound. Async callers run it on the blocking pool.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hashes `plaintext` with a fresh salt at work factor `cost`.
    ///
    /// # Errors
    ///
    /// Returns [`PasswordHashError::Hashing`] if `cost` is outside
    /// [`MIN_PASSWORD_COST`]..=[`MAX_PASSWORD_COST`].
    pub fn hash(plaintext: &str, cost: u32) -> Result<Self, PasswordHashError> {
        Ok(Self(bcrypt::hash(plaintext, cost)?))
    }

    /// Restores a hash read back from storage.
    ///
    /// # Errors
    ///
    /// Returns [`PasswordHashError::Malformed`] unless `bytes` holds a
    /// bcrypt hash.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PasswordHashError> {
        let encoded = String::from_utf8(bytes).map_err(|_| PasswordHashError::Malformed)?;
        let recognised = encoded.len() == BCRYPT_HASH_LENGTH
            && BCRYPT_PREFIXES.iter().any(|prefix| encoded.starts_with(prefix));
        if !recognised {
            return Err(PasswordHashError::Malformed);
        }
        Ok(Self(encoded))
    }

    /// Returns the stored representation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Checks `plaintext` against the hash.
    #[must_use]
    pub fn matches(&self, plaintext: &str) -> bool {
        bcrypt::verify(plaintext, &self.0).unwrap_or(false)
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("PasswordHash(..)")
    }
}

// =============================================================================
// User
// =============================================================================

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub password_hash: PasswordHash,
    pub activated: bool,
    pub version: i32,
}

impl User {
    /// Materialises a newly inserted user at the initial version.
    #[must_use]
    pub fn from_new(id: UserId, created_at: DateTime<Utc>, new: NewUser) -> Self {
        Self {
            id,
            created_at,
            name: new.name,
            email: new.email,
            password_hash: new.password_hash,
            activated: new.activated,
            version: INITIAL_VERSION,
        }
    }
}

/// Fields supplied when registering a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: PasswordHash,
    pub activated: bool,
}

/// Partial update of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserChanges {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<PasswordHash>,
    pub activated: Option<bool>,
}

impl UserChanges {
    /// Returns true if no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.activated.is_none()
    }
}

impl VersionedEntity for User {
    type Id = UserId;
    type Draft = NewUser;
    type Changes = UserChanges;

    const KIND: &'static str = "user";

    fn id(&self) -> UserId {
        self.id
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn apply(&mut self, changes: &UserChanges, version: i32) {
        if let Some(name) = &changes.name {
            self.name.clone_from(name);
        }
        if let Some(email) = &changes.email {
            self.email.clone_from(email);
        }
        if let Some(password_hash) = &changes.password_hash {
            self.password_hash = password_hash.clone();
        }
        if let Some(activated) = changes.activated {
            self.activated = activated;
        }
        self.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn quick_hash(plaintext: &str) -> PasswordHash {
        PasswordHash::hash(plaintext, MIN_PASSWORD_COST).unwrap()
    }

    #[rstest]
    fn test_password_hash_matches_plaintext() {
        let hash = quick_hash("pa55word!");
        assert!(hash.matches("pa55word!"));
        assert!(!hash.matches("pa55word?"));
    }

    #[rstest]
    fn test_password_hash_is_salted() {
        assert_ne!(quick_hash("pa55word!"), quick_hash("pa55word!"));
    }

    #[rstest]
    #[case(MIN_PASSWORD_COST, "$2b$04$")]
    #[case(5, "$2b$05$")]
    fn test_password_hash_records_cost(#[case] cost: u32, #[case] prefix: &str) {
        let hash = PasswordHash::hash("pa55word!", cost).unwrap();
        assert!(hash.as_bytes().starts_with(prefix.as_bytes()));
        assert_eq!(hash.as_bytes().len(), BCRYPT_HASH_LENGTH);
    }

    #[rstest]
    #[case(MIN_PASSWORD_COST - 1)]
    #[case(MAX_PASSWORD_COST + 1)]
    fn test_password_hash_rejects_cost_out_of_range(#[case] cost: u32) {
        assert!(matches!(
            PasswordHash::hash("pa55word!", cost),
            Err(PasswordHashError::Hashing(_))
        ));
    }

    #[rstest]
    fn test_password_hash_round_trips_through_bytes() {
        let hash = quick_hash("correct horse");
        let restored = PasswordHash::from_bytes(hash.as_bytes().to_vec()).unwrap();
        assert!(restored.matches("correct horse"));
    }

    #[rstest]
    fn test_default_cost_is_twelve() {
        assert_eq!(DEFAULT_PASSWORD_COST, 12);
    }

    #[rstest]
    #[case(vec![0; 10])]
    #[case(vec![0xff; BCRYPT_HASH_LENGTH])]
    #[case(format!("$1${}", "a".repeat(BCRYPT_HASH_LENGTH - 3)).into_bytes())]
    fn test_password_hash_rejects_foreign_bytes(#[case] bytes: Vec<u8>) {
        assert!(matches!(
            PasswordHash::from_bytes(bytes),
            Err(PasswordHashError::Malformed)
        ));
    }

    #[rstest]
    fn test_debug_does_not_leak_hash() {
        let hash = quick_hash("secret-value");
        assert_eq!(format!("{hash:?}"), "PasswordHash(..)");
    }

    #[rstest]
    fn test_apply_updates_only_present_fields() {
        let mut user = User::from_new(
            UserId::new(3),
            Utc::now(),
            NewUser {
                name: "Alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: quick_hash("pa55word!"),
                activated: false,
            },
        );

        user.apply(
            &UserChanges {
                activated: Some(true),
                ..UserChanges::default()
            },
            2,
        );

        assert!(user.activated);
        assert_eq!(user.name, "Alice");
        assert_eq!(user.version, 2);
    }
}
