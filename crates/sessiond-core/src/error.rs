//! Error taxonomy for registry operations.
//!
//! Every public registry operation fails with one of the kinds below.
//! Callers branch on the kind, not on message text: `InvalidArgument` and
//! `OutOfRange` are caller mistakes, `NotAllowed` is an authorization
//! verdict, and `InternalFailure` means a collaborator (user directory or
//! bus publisher) broke underneath a structurally valid request.
//!
//! An unknown owner during `create` is deliberately NOT an error kind: it
//! aborts that single create with an empty result and nothing else.

use thiserror::Error;

/// Errors surfaced by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The request named a session, identifier, or field that does not
    /// exist or is malformed.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Description of the rejected argument.
        reason: String,
    },

    /// An identifier's text form exceeds the width of the identifier type.
    #[error("out of range: {reason}")]
    OutOfRange {
        /// Description of the out-of-range input.
        reason: String,
    },

    /// The caller is not permitted to act on the target session.
    #[error("not allowed: {reason}")]
    NotAllowed {
        /// Description of the failed authorization check.
        reason: String,
    },

    /// A collaborator was unreachable or returned malformed data, or the
    /// table mutated but the bus-side reflection could not follow.
    #[error("internal failure: {reason}")]
    InternalFailure {
        /// Description of the collaborator failure.
        reason: String,
    },
}

impl RegistryError {
    /// Creates an `InvalidArgument` error.
    #[must_use]
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Creates an `OutOfRange` error.
    #[must_use]
    pub fn out_of_range(reason: impl Into<String>) -> Self {
        Self::OutOfRange {
            reason: reason.into(),
        }
    }

    /// Creates a `NotAllowed` error.
    #[must_use]
    pub fn not_allowed(reason: impl Into<String>) -> Self {
        Self::NotAllowed {
            reason: reason.into(),
        }
    }

    /// Creates an `InternalFailure` error.
    #[must_use]
    pub fn internal_failure(reason: impl Into<String>) -> Self {
        Self::InternalFailure {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error reports a caller mistake rather than a
    /// broken collaborator.
    #[must_use]
    pub const fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. } | Self::OutOfRange { .. } | Self::NotAllowed { .. }
        )
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
