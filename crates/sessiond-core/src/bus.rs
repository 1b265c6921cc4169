//! The publish/retract contract consumed by the registry.
//!
//! The registry owns session state; the bus side holds only a reflection
//! of it. On every mutation the registry asks the publisher to mirror the
//! change at the session's stable address. The registry converts publisher
//! failures into its own error taxonomy and never retries; retry policy,
//! timeouts, and the transport itself belong to the publisher.

use thiserror::Error;

use crate::session::SessionRecord;

/// Error type for bus publication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The bus rejected the operation for this address.
    #[error("bus rejected {path}: {reason}")]
    Rejected {
        /// The object address the operation targeted.
        path: String,
        /// Description of the rejection.
        reason: String,
    },

    /// The bus could not be reached.
    #[error("bus unavailable: {reason}")]
    Unavailable {
        /// Description of the transport failure.
        reason: String,
    },
}

/// Capability for mirroring session records onto the object bus.
pub trait BusPublisher: Send + Sync {
    /// Exposes `record` at the given stable address, replacing any
    /// previous snapshot there.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishError`] if the bus refuses or cannot be reached.
    fn publish(&self, path: &str, record: &SessionRecord) -> Result<(), PublishError>;

    /// Removes the object at the given address from the bus.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishError`] if no object lives at the address or the
    /// bus cannot be reached.
    fn retract(&self, path: &str) -> Result<(), PublishError>;
}
