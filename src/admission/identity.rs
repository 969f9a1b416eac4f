//! Client identity used as the rate-limit key.

use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

/// Failure to derive a client identity from a connection.
///
/// Deliberately separate from a throttle decision: the caller answers it
/// with a server error, not with 429.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The connection carried no remote address.
    #[error("remote address is unavailable")]
    Unavailable,

    /// The identity string was empty.
    #[error("client identity must not be empty")]
    Empty,
}

/// Rate-limit subject, derived from the remote address without its port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    /// Creates an identity from an arbitrary non-empty key.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Empty`] when `value` is empty or whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentityError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdentityError::Empty);
        }
        Ok(Self(value))
    }

    /// Derives the identity from a peer socket address, dropping the port.
    #[must_use]
    pub fn from_socket_addr(address: &SocketAddr) -> Self {
        Self(address.ip().to_string())
    }

    /// Derives the identity from an optional peer address.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Unavailable`] when no address is present.
    pub fn from_peer(address: Option<&SocketAddr>) -> Result<Self, IdentityError> {
        address
            .map(Self::from_socket_addr)
            .ok_or(IdentityError::Unavailable)
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}
