//! Collision-avoiding session identifier generation.
//!
//! Identifiers mix a high-resolution timestamp hash with a fixed
//! service-identity hash. The mix is non-cryptographic: identifiers are
//! not secrets, they only need good practical uniqueness without external
//! state. The generator rejects the reserved sentinel and nothing else;
//! it never probes the live table, so a collision between two distinct
//! calls is a theoretical, accepted risk.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::session::SessionId;

/// Produces session identifiers for one registry instance.
///
/// Stateless apart from the service-identity hash fixed at construction;
/// [`generate`](Self::generate) has no side effects and never blocks.
#[derive(Debug, Clone)]
pub struct IdentifierGenerator {
    /// Hash of the service identity, mixed into every identifier.
    service_hash: u64,
}

impl IdentifierGenerator {
    /// Creates a generator bound to the given service identity.
    #[must_use]
    pub fn new(service_name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        service_name.hash(&mut hasher);
        Self {
            service_hash: hasher.finish(),
        }
    }

    /// Generates a new session identifier.
    ///
    /// The result is never [`SessionId::INVALID`]; on the rare sentinel
    /// collision the generator retries with a fresh timestamp.
    #[must_use]
    pub fn generate(&self) -> SessionId {
        loop {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();

            let mut hasher = DefaultHasher::new();
            now.as_nanos().hash(&mut hasher);
            let time_hash = hasher.finish();

            let raw = time_hash ^ (self.service_hash << 1);
            if raw != SessionId::INVALID.raw() {
                return SessionId::new(raw);
            }
        }
    }
}
