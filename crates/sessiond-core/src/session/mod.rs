//! Session identity and record types.
//!
//! A session is identified by an opaque [`SessionId`] whose external text
//! form is fixed-width lowercase hexadecimal. The [`SessionRecord`] is the
//! entity the registry owns: identity, owner, transport metadata, and the
//! PID of the front-end service instance that registered it (used only for
//! liveness checks).

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::RegistryError;

/// Width of a session identifier's hexadecimal text form.
///
/// One nibble per digit over the full native width of the identifier type,
/// zero-padded, so every identifier renders to the same number of
/// characters.
pub const SESSION_ID_HEX_WIDTH: usize = (u64::BITS / 4) as usize;

/// Opaque session identifier.
///
/// The value `0` is the reserved sentinel ([`SessionId::INVALID`]) and is
/// never assigned to a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// The reserved sentinel identifier. Never carried by a live record.
    pub const INVALID: Self = Self(0);

    /// Wraps a raw identifier value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` if this identifier is not the reserved sentinel.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// Parses an identifier from its fixed-width hexadecimal text form.
    ///
    /// Inputs shorter than [`SESSION_ID_HEX_WIDTH`] are accepted (leading
    /// zeros may be dropped by sloppy callers); inputs longer than the
    /// identifier width cannot fit and are rejected as out of range.
    ///
    /// # Errors
    ///
    /// Returns [`IdParseError::Malformed`] for empty or non-hexadecimal
    /// input and [`IdParseError::OutOfRange`] for input wider than the
    /// identifier type.
    pub fn parse_hex(text: &str) -> Result<Self, IdParseError> {
        if text.is_empty() {
            return Err(IdParseError::Malformed {
                text: text.to_string(),
            });
        }
        if text.len() > SESSION_ID_HEX_WIDTH {
            return Err(IdParseError::OutOfRange {
                text: text.to_string(),
            });
        }
        u64::from_str_radix(text, 16)
            .map(Self)
            .map_err(|_| IdParseError::Malformed {
                text: text.to_string(),
            })
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:01$x}", self.0, SESSION_ID_HEX_WIDTH)
    }
}

/// Error type for identifier text parsing.
///
/// The registry surfaces these kinds to its callers unchanged (as the
/// matching [`RegistryError`] kinds).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// The input is empty or contains non-hexadecimal characters.
    #[error("malformed session identifier: {text:?}")]
    Malformed {
        /// The rejected input.
        text: String,
    },

    /// The input is wider than the identifier type.
    #[error("session identifier out of range: {text:?}")]
    OutOfRange {
        /// The rejected input.
        text: String,
    },
}

impl From<IdParseError> for RegistryError {
    fn from(err: IdParseError) -> Self {
        match err {
            IdParseError::Malformed { .. } => Self::invalid_argument(err.to_string()),
            IdParseError::OutOfRange { .. } => Self::out_of_range(err.to_string()),
        }
    }
}

/// Classification of a session's originating front-end.
///
/// The registry treats this as an opaque tag: it is compared for equality
/// by the bulk-close operations and otherwise passed through to the bus
/// publisher untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    /// Generic interactive login.
    Interactive,
    /// Host serial-console session.
    HostConsole,
    /// Management-controller console session.
    ManagerConsole,
    /// Web front-end session.
    WebUi,
    /// Remote-management (Redfish) session.
    Redfish,
    /// IPMI session.
    Ipmi,
}

impl SessionType {
    /// Returns the tag as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::HostConsole => "host-console",
            Self::ManagerConsole => "manager-console",
            Self::WebUi => "web-ui",
            Self::Redfish => "redfish",
            Self::Ipmi => "ipmi",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live session tracked by the registry.
///
/// Records are created and mutated only by the owning
/// [`SessionRegistry`](crate::registry::SessionRegistry); everyone else
/// sees clones. `owner` is `None` when the session was registered without a
/// username or the username could not be resolved yet; such a record never
/// matches ownership rules until the owner is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier, never the sentinel.
    pub id: SessionId,
    /// Username owning the session, if resolved.
    pub owner: Option<String>,
    /// Remote address the session originates from. May be empty.
    pub remote_address: String,
    /// Front-end classification tag.
    pub session_type: SessionType,
    /// PID of the front-end service instance that registered the session.
    /// Used solely for liveness checks.
    pub owner_pid: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Creates a new unowned record.
    #[must_use]
    pub fn new(
        id: SessionId,
        session_type: SessionType,
        remote_address: impl Into<String>,
        owner_pid: u32,
    ) -> Self {
        Self {
            id,
            owner: None,
            remote_address: remote_address.into(),
            session_type,
            owner_pid,
            created_at: Utc::now(),
        }
    }

    /// Returns the owner username, if resolved.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Returns `true` if the record is owned by the given user.
    ///
    /// An unowned record matches no user.
    #[must_use]
    pub fn owned_by(&self, username: &str) -> bool {
        self.owner.as_deref() == Some(username)
    }

    /// Returns the procfs path of the owning service process.
    #[must_use]
    pub fn proc_path(&self) -> PathBuf {
        PathBuf::from("/proc").join(self.owner_pid.to_string())
    }
}
