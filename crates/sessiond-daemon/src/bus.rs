//! In-process reflection of the object bus.
//!
//! [`ObjectDirectory`] is the daemon-side adapter behind the registry's
//! publish/retract contract: a path → snapshot map the transport layer
//! serves from. It holds no authority over session state; the registry's
//! table is the single source of truth and this directory only mirrors its
//! mutations.

use std::collections::HashMap;
use std::sync::RwLock;

use sessiond_core::bus::{BusPublisher, PublishError};
use sessiond_core::session::SessionRecord;
use tracing::debug;

/// Path-addressable store of published session snapshots.
#[derive(Debug, Default)]
pub struct ObjectDirectory {
    /// Published snapshots keyed by bus address.
    objects: RwLock<HashMap<String, SessionRecord>>,
}

impl ObjectDirectory {
    /// Creates an empty object directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the snapshot published at `path`, if any.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<SessionRecord> {
        let objects = self.objects.read().expect("lock poisoned");
        objects.get(path).cloned()
    }

    /// Returns every published address, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let objects = self.objects.read().expect("lock poisoned");
        let mut paths: Vec<String> = objects.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Returns the number of published objects.
    #[must_use]
    pub fn len(&self) -> usize {
        let objects = self.objects.read().expect("lock poisoned");
        objects.len()
    }

    /// Returns `true` if nothing is published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BusPublisher for ObjectDirectory {
    fn publish(&self, path: &str, record: &SessionRecord) -> Result<(), PublishError> {
        let mut objects = self.objects.write().expect("lock poisoned");
        objects.insert(path.to_string(), record.clone());
        debug!(path, session = %record.id, "session published");
        Ok(())
    }

    fn retract(&self, path: &str) -> Result<(), PublishError> {
        let mut objects = self.objects.write().expect("lock poisoned");
        if objects.remove(path).is_none() {
            return Err(PublishError::Rejected {
                path: path.to_string(),
                reason: "no object at this address".to_string(),
            });
        }
        debug!(path, "session retracted");
        Ok(())
    }
}
