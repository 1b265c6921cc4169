//! User-directory capability and authorization policy.
//!
//! The registry never stores users; it consults an external user directory
//! through the [`UserDirectory`] trait for two things: confirming that a
//! username exists (owner resolution at create time) and reading its
//! privilege tier (authorization gating on close).
//!
//! Directory failures are hard failures. A broken or unreachable directory
//! must NOT silently downgrade a caller to "not privileged", so
//! [`AuthorizationPolicy`] converts every directory error into an internal
//! failure that propagates to the caller of the gated operation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};

/// The reserved superuser account. Sessions owned by it are never tracked;
/// owner resolution treats the name as unknown.
pub const RESERVED_SUPERUSER: &str = "root";

/// Privilege tier reported by the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrivilegeLevel {
    /// The highest administrative tier (`priv-admin`).
    Admin,
    /// Operator tier (`priv-operator`).
    Operator,
    /// Ordinary user tier (`priv-user`).
    User,
    /// No access (`priv-noaccess`).
    NoAccess,
}

impl PrivilegeLevel {
    /// Returns the directory's wire name for this tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "priv-admin",
            Self::Operator => "priv-operator",
            Self::User => "priv-user",
            Self::NoAccess => "priv-noaccess",
        }
    }

    /// Parses a tier from its wire name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "priv-admin" => Some(Self::Admin),
            "priv-operator" => Some(Self::Operator),
            "priv-user" => Some(Self::User),
            "priv-noaccess" => Some(Self::NoAccess),
            _ => None,
        }
    }

    /// Returns `true` for the highest administrative tier.
    #[must_use]
    pub const fn is_administrative(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for user-directory lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The directory has no such user.
    #[error("unknown user: {username}")]
    UnknownUser {
        /// The username that was not found.
        username: String,
    },

    /// The directory could not be reached.
    #[error("user directory unreachable: {reason}")]
    Unreachable {
        /// Description of the transport failure.
        reason: String,
    },

    /// The directory answered, but the response was empty or omitted the
    /// privilege attribute.
    #[error("malformed directory response: {reason}")]
    MalformedResponse {
        /// Description of the malformed response.
        reason: String,
    },
}

/// Capability for querying the external user directory.
pub trait UserDirectory: Send + Sync {
    /// Looks up the privilege tier of a user.
    ///
    /// A successful return also confirms the user exists.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::UnknownUser`] for a nonexistent account
    /// and the other variants for transport or response failures.
    fn privilege_of(&self, username: &str) -> Result<PrivilegeLevel, DirectoryError>;
}

/// Decides whether a user may act on sessions it does not own.
pub struct AuthorizationPolicy {
    /// The consulted user directory.
    directory: Arc<dyn UserDirectory>,
}

impl AuthorizationPolicy {
    /// Creates a policy backed by the given directory.
    #[must_use]
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    /// Returns `true` iff the user holds the highest administrative tier.
    ///
    /// # Errors
    ///
    /// Returns `InternalFailure` when the directory is unreachable, returns
    /// a malformed response, or does not know the user. Never a silent
    /// `false`.
    pub fn is_privileged(&self, username: &str) -> RegistryResult<bool> {
        match self.directory.privilege_of(username) {
            Ok(level) => {
                debug!(user = username, tier = %level, "privilege lookup");
                Ok(level.is_administrative())
            },
            Err(err) => Err(RegistryError::internal_failure(format!(
                "privilege lookup for {username} failed: {err}"
            ))),
        }
    }
}

/// Map-backed user directory.
///
/// Suitable for tests and for embedding the registry without a remote
/// directory; entries are registered up front.
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    /// Known users and their tiers.
    users: RwLock<HashMap<String, PrivilegeLevel>>,
}

impl InMemoryUserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user with the given tier, replacing any previous entry.
    pub fn insert(&self, username: impl Into<String>, level: PrivilegeLevel) {
        let mut users = self.users.write().expect("lock poisoned");
        users.insert(username.into(), level);
    }

    /// Removes a user.
    pub fn remove(&self, username: &str) {
        let mut users = self.users.write().expect("lock poisoned");
        users.remove(username);
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn privilege_of(&self, username: &str) -> Result<PrivilegeLevel, DirectoryError> {
        let users = self.users.read().expect("lock poisoned");
        users
            .get(username)
            .copied()
            .ok_or_else(|| DirectoryError::UnknownUser {
                username: username.to_string(),
            })
    }
}
