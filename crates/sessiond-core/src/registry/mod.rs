//! The session registry and its operation surface.
//!
//! [`SessionRegistry`] owns the id → record table. It is the single source
//! of truth: the bus publisher holds only a reflection of it, and no other
//! component carries a mutation capability. Every operation, the
//! liveness-eviction pass included, serializes on one lock held for the
//! whole operation, directory and publisher calls too, so a caller
//! observes its own operations in submission order and an eviction is
//! visible to the very next lookup.
//!
//! # Ownership rules on close
//!
//! `close_by_id(caller, target)` succeeds when the caller closes itself,
//! when both sessions carry the same resolved owner, or when the caller's
//! owner holds the administrative tier. Records without a resolved owner
//! never match by ownership, and a caller without an owner is never
//! privileged.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::bus::BusPublisher;
use crate::directory::{
    AuthorizationPolicy, DirectoryError, UserDirectory, RESERVED_SUPERUSER,
};
use crate::error::{RegistryError, RegistryResult};
use crate::identifier::IdentifierGenerator;
use crate::process::ProcessProbe;
use crate::session::{IdParseError, SessionId, SessionRecord, SessionType};

/// Mutable registry state, consolidated under a single lock.
#[derive(Debug, Default)]
struct RegistryState {
    /// Live sessions indexed by identifier.
    sessions: HashMap<SessionId, SessionRecord>,
}

/// The session registry.
///
/// Construct one per process; its lifetime is the process lifetime, and the
/// table is volatile: a restart starts from an empty registry.
pub struct SessionRegistry {
    /// Consolidated mutable state under a single lock.
    state: RwLock<RegistryState>,
    /// Identifier generation bound to the service identity.
    generator: IdentifierGenerator,
    /// Owner resolution and privilege lookups.
    directory: Arc<dyn UserDirectory>,
    /// Bus-side reflection of the table.
    publisher: Arc<dyn BusPublisher>,
    /// Privilege gate built over the same directory.
    policy: AuthorizationPolicy,
    /// Base address under which sessions are published.
    base_path: String,
}

impl SessionRegistry {
    /// Creates an empty registry.
    ///
    /// `service_name` seeds identifier generation; `base_path` is the fixed
    /// prefix of every session's bus address.
    #[must_use]
    pub fn new(
        service_name: &str,
        base_path: impl Into<String>,
        directory: Arc<dyn UserDirectory>,
        publisher: Arc<dyn BusPublisher>,
    ) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            generator: IdentifierGenerator::new(service_name),
            policy: AuthorizationPolicy::new(Arc::clone(&directory)),
            directory,
            publisher,
            base_path: base_path.into(),
        }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Creates a session and publishes it on the bus.
    ///
    /// An empty `owner` registers the session without an owner association;
    /// it still exists and is published, but matches no ownership rule. A
    /// non-empty `owner` the directory does not know aborts the create with
    /// `Ok(None)`: not created, nothing published, no error raised.
    ///
    /// # Errors
    ///
    /// Returns `InternalFailure` if the directory breaks during owner
    /// resolution or the publisher refuses the new record (in which case
    /// the record is removed again; a session that never became
    /// addressable never existed).
    pub fn create(
        &self,
        owner: &str,
        remote_address: &str,
        session_type: SessionType,
        caller_pid: u32,
    ) -> RegistryResult<Option<SessionId>> {
        let mut state = self.state.write().expect("lock poisoned");

        let id = self.generator.generate();
        let mut record = SessionRecord::new(id, session_type, remote_address, caller_pid);

        if !owner.is_empty() {
            match self.resolve_owner(owner)? {
                Some(username) => record.owner = Some(username),
                None => {
                    debug!(owner, "skipping session for unresolved owner");
                    return Ok(None);
                },
            }
        }

        let path = self.session_path(id);
        state.sessions.insert(id, record.clone());
        if let Err(err) = self.publisher.publish(&path, &record) {
            state.sessions.remove(&id);
            return Err(RegistryError::internal_failure(format!(
                "failed to publish session {id}: {err}"
            )));
        }

        debug!(
            session = %id,
            owner = record.owner.as_deref().unwrap_or(""),
            session_type = %session_type,
            caller_pid,
            "session created"
        );
        Ok(Some(id))
    }

    /// Resolves a non-empty owner name against the directory.
    ///
    /// `Ok(None)` means the session must not be created for this owner:
    /// either the directory does not know the name, or it is the reserved
    /// superuser, which is never tracked.
    fn resolve_owner(&self, owner: &str) -> RegistryResult<Option<String>> {
        if owner == RESERVED_SUPERUSER {
            return Ok(None);
        }
        match self.directory.privilege_of(owner) {
            Ok(_) => Ok(Some(owner.to_string())),
            Err(DirectoryError::UnknownUser { .. }) => Ok(None),
            Err(err) => Err(RegistryError::internal_failure(format!(
                "owner resolution for {owner} failed: {err}"
            ))),
        }
    }

    // ========================================================================
    // Single-session operations
    // ========================================================================

    /// Looks up a session by identifier.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if no session carries the identifier.
    pub fn lookup(&self, id: SessionId) -> RegistryResult<SessionRecord> {
        let state = self.state.read().expect("lock poisoned");
        state
            .sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistryError::invalid_argument(format!("no session with id {id}")))
    }

    /// Closes exactly one session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if no session carries the identifier, and
    /// `InternalFailure` if the bus-side retraction fails after the table
    /// removal. The table mutation is NOT rolled back; the registry favors
    /// table consistency over publisher consistency.
    pub fn close(&self, id: SessionId) -> RegistryResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        self.close_locked(&mut state, id)
    }

    /// Authorization-gated close.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if either identifier is absent,
    /// `NotAllowed` if the caller fails every ownership rule, and
    /// `InternalFailure` if the privilege lookup breaks or retraction
    /// fails.
    pub fn close_by_id(&self, caller: SessionId, target: SessionId) -> RegistryResult<()> {
        let mut state = self.state.write().expect("lock poisoned");

        let caller_owner = Self::owner_of(&state, caller)?;
        let target_owner = Self::owner_of(&state, target)?;

        let mut allowed = caller == target
            || matches!((&caller_owner, &target_owner), (Some(a), Some(b)) if a == b);
        if !allowed {
            if let Some(username) = caller_owner.as_deref() {
                allowed = self.policy.is_privileged(username)?;
            }
        }
        if !allowed {
            return Err(RegistryError::not_allowed(format!(
                "session {caller} may not close session {target}"
            )));
        }

        self.close_locked(&mut state, target)
    }

    /// Re-resolves a session's owner and remote address, then republishes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an absent session, an empty owner or
    /// remote address, or an owner the directory does not know; and
    /// `InternalFailure` for directory or publisher breakage (the table
    /// mutation stands).
    pub fn set_session_metadata(
        &self,
        id: SessionId,
        owner: &str,
        remote_address: &str,
    ) -> RegistryResult<()> {
        let mut state = self.state.write().expect("lock poisoned");

        if !state.sessions.contains_key(&id) {
            return Err(RegistryError::invalid_argument(format!(
                "no session with id {id}"
            )));
        }
        if owner.is_empty() {
            return Err(RegistryError::invalid_argument(
                "session owner must not be empty",
            ));
        }
        if remote_address.is_empty() {
            return Err(RegistryError::invalid_argument(
                "remote address must not be empty",
            ));
        }
        let Some(username) = self.resolve_owner(owner)? else {
            return Err(RegistryError::invalid_argument(format!(
                "unknown session owner: {owner}"
            )));
        };

        let Some(record) = state.sessions.get_mut(&id) else {
            return Err(RegistryError::invalid_argument(format!(
                "no session with id {id}"
            )));
        };
        record.owner = Some(username);
        record.remote_address = remote_address.to_string();
        let snapshot = record.clone();

        let path = self.session_path(id);
        if let Err(err) = self.publisher.publish(&path, &snapshot) {
            return Err(RegistryError::internal_failure(format!(
                "failed to republish session {id}: {err}"
            )));
        }
        debug!(session = %id, owner, "session metadata updated");
        Ok(())
    }

    // ========================================================================
    // Bulk operations
    // ========================================================================

    /// Removes every session of the given type. No authorization check:
    /// this is a privileged bulk operation for trusted internal logic.
    ///
    /// Returns the number of removed sessions.
    pub fn close_all_by_type(&self, session_type: SessionType) -> usize {
        let mut state = self.state.write().expect("lock poisoned");
        self.remove_matching(&mut state, |record| record.session_type == session_type)
    }

    /// Removes sessions of the given type on behalf of `caller`, always
    /// excluding the caller's own session.
    ///
    /// The candidate set is every matching session when the caller is
    /// privileged and `owned_only` is false; otherwise only sessions
    /// sharing the caller's owner. Privilege is consulted only when the
    /// wider set is requested, so an owned-only close cannot fail on a
    /// broken directory.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the caller identifier is absent and
    /// `InternalFailure` if the privilege lookup breaks.
    pub fn close_user_sessions_by_type(
        &self,
        caller: SessionId,
        session_type: SessionType,
        owned_only: bool,
    ) -> RegistryResult<usize> {
        let mut state = self.state.write().expect("lock poisoned");

        let caller_owner = Self::owner_of(&state, caller)?;
        let all_of_type = if owned_only {
            false
        } else {
            match caller_owner.as_deref() {
                Some(username) => self.policy.is_privileged(username)?,
                None => false,
            }
        };

        let count = self.remove_matching(&mut state, |record| {
            if record.id == caller || record.session_type != session_type {
                return false;
            }
            if all_of_type {
                return true;
            }
            matches!((&record.owner, &caller_owner), (Some(a), Some(b)) if a == b)
        });
        Ok(count)
    }

    /// Removes every session owned by `owner`. Returns the removed count.
    pub fn remove_all_for_owner(&self, owner: &str) -> usize {
        let mut state = self.state.write().expect("lock poisoned");
        self.remove_matching(&mut state, |record| record.owned_by(owner))
    }

    /// Removes every session originating from `remote_address`. Returns
    /// the removed count.
    pub fn remove_all_by_remote_address(&self, remote_address: &str) -> usize {
        let mut state = self.state.write().expect("lock poisoned");
        self.remove_matching(&mut state, |record| record.remote_address == remote_address)
    }

    /// Unconditionally removes every session. Returns the prior size.
    pub fn remove_all(&self) -> usize {
        let mut state = self.state.write().expect("lock poisoned");
        self.remove_matching(&mut state, |_| true)
    }

    // ========================================================================
    // Liveness eviction
    // ========================================================================

    /// One liveness-sweep pass: removes every session whose owning process
    /// no longer exists. Returns the evicted count.
    ///
    /// Per-record publisher failures are logged and skipped; the pass
    /// itself never fails and tolerates an empty registry.
    pub fn evict_dead_owners(&self, probe: &dyn ProcessProbe) -> usize {
        let mut state = self.state.write().expect("lock poisoned");
        self.remove_matching(&mut state, |record| {
            let alive = probe.is_alive(record.owner_pid);
            if !alive {
                debug!(
                    session = %record.id,
                    owner_pid = record.owner_pid,
                    "session owner process is gone"
                );
            }
            !alive
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        let state = self.state.read().expect("lock poisoned");
        state.sessions.len()
    }

    /// Returns `true` if no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the bus address of a session: `<base_path>/<hex id>`.
    #[must_use]
    pub fn session_path(&self, id: SessionId) -> String {
        format!("{}/{id}", self.base_path)
    }

    /// Parses a session identifier from the last segment of a bus address.
    ///
    /// # Errors
    ///
    /// Returns an [`IdParseError`] if the last segment is not a valid
    /// identifier text form.
    pub fn id_from_path(path: &str) -> Result<SessionId, IdParseError> {
        let segment = path.rsplit('/').next().unwrap_or(path);
        SessionId::parse_hex(segment)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Returns the owner of a session, failing if the id is absent.
    fn owner_of(state: &RegistryState, id: SessionId) -> RegistryResult<Option<String>> {
        state
            .sessions
            .get(&id)
            .map(|record| record.owner.clone())
            .ok_or_else(|| RegistryError::invalid_argument(format!("no session with id {id}")))
    }

    /// Removes one session that is known to exist or not, converting an
    /// absent id into `InvalidArgument` and a failed retraction into
    /// `InternalFailure` without restoring the table entry.
    fn close_locked(&self, state: &mut RegistryState, id: SessionId) -> RegistryResult<()> {
        if state.sessions.remove(&id).is_none() {
            return Err(RegistryError::invalid_argument(format!(
                "no session with id {id}"
            )));
        }

        let path = self.session_path(id);
        if let Err(err) = self.publisher.retract(&path) {
            return Err(RegistryError::internal_failure(format!(
                "failed to retract session {id}: {err}"
            )));
        }
        debug!(session = %id, "session closed");
        Ok(())
    }

    /// Removes every session matching the predicate and retracts each from
    /// the bus. A failed retraction is logged and skipped; the count
    /// reflects table removals.
    fn remove_matching(
        &self,
        state: &mut RegistryState,
        mut matches: impl FnMut(&SessionRecord) -> bool,
    ) -> usize {
        let doomed: Vec<SessionId> = state
            .sessions
            .values()
            .filter(|record| matches(record))
            .map(|record| record.id)
            .collect();

        for id in &doomed {
            state.sessions.remove(id);
            let path = self.session_path(*id);
            if let Err(err) = self.publisher.retract(&path) {
                warn!(session = %id, error = %err, "failed to retract removed session");
            } else {
                debug!(session = %id, "session removed");
            }
        }
        doomed.len()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("base_path", &self.base_path)
            .field("sessions", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::bus::PublishError;
    use crate::directory::{InMemoryUserDirectory, PrivilegeLevel};

    use super::*;

    /// Publisher double that mirrors paths and can be switched to fail.
    #[derive(Default)]
    struct TestPublisher {
        published: Mutex<Vec<String>>,
        fail_publish: Mutex<bool>,
        fail_retract: Mutex<bool>,
    }

    impl TestPublisher {
        fn paths(&self) -> Vec<String> {
            self.published.lock().unwrap().clone()
        }

        fn set_fail_publish(&self, fail: bool) {
            *self.fail_publish.lock().unwrap() = fail;
        }

        fn set_fail_retract(&self, fail: bool) {
            *self.fail_retract.lock().unwrap() = fail;
        }
    }

    impl BusPublisher for TestPublisher {
        fn publish(&self, path: &str, _record: &SessionRecord) -> Result<(), PublishError> {
            if *self.fail_publish.lock().unwrap() {
                return Err(PublishError::Unavailable {
                    reason: "publish disabled".to_string(),
                });
            }
            let mut published = self.published.lock().unwrap();
            if !published.iter().any(|p| p == path) {
                published.push(path.to_string());
            }
            Ok(())
        }

        fn retract(&self, path: &str) -> Result<(), PublishError> {
            if *self.fail_retract.lock().unwrap() {
                return Err(PublishError::Unavailable {
                    reason: "retract disabled".to_string(),
                });
            }
            self.published.lock().unwrap().retain(|p| p != path);
            Ok(())
        }
    }

    fn make_registry() -> (Arc<SessionRegistry>, Arc<TestPublisher>) {
        let directory = Arc::new(InMemoryUserDirectory::new());
        directory.insert("alice", PrivilegeLevel::User);
        directory.insert("bob", PrivilegeLevel::User);
        directory.insert("admin", PrivilegeLevel::Admin);

        let publisher = Arc::new(TestPublisher::default());
        let registry = Arc::new(SessionRegistry::new(
            "sessiond",
            "/sessiond/sessions",
            directory,
            Arc::clone(&publisher) as Arc<dyn BusPublisher>,
        ));
        (registry, publisher)
    }

    fn create(registry: &SessionRegistry, owner: &str, session_type: SessionType) -> SessionId {
        registry
            .create(owner, "10.0.0.5", session_type, std::process::id())
            .unwrap()
            .expect("session should be created")
    }

    #[test]
    fn test_create_returns_valid_id_and_publishes() {
        let (registry, publisher) = make_registry();
        let id = create(&registry, "alice", SessionType::Interactive);

        assert!(id.is_valid());
        assert_eq!(registry.len(), 1);
        assert_eq!(publisher.paths(), vec![registry.session_path(id)]);

        let record = registry.lookup(id).unwrap();
        assert_eq!(record.owner(), Some("alice"));
        assert_eq!(record.remote_address, "10.0.0.5");
        assert_eq!(record.session_type, SessionType::Interactive);
    }

    #[test]
    fn test_create_without_owner_yields_unowned_record() {
        let (registry, _) = make_registry();
        let id = registry
            .create("", "10.0.0.5", SessionType::HostConsole, 100)
            .unwrap()
            .unwrap();
        assert!(registry.lookup(id).unwrap().owner().is_none());
    }

    #[test]
    fn test_create_unknown_owner_is_not_created() {
        let (registry, publisher) = make_registry();
        let result = registry
            .create("mallory", "10.0.0.5", SessionType::WebUi, 100)
            .unwrap();
        assert!(result.is_none());
        assert!(registry.is_empty());
        assert!(publisher.paths().is_empty());
    }

    #[test]
    fn test_create_superuser_owner_is_not_created() {
        let (registry, publisher) = make_registry();
        let result = registry
            .create("root", "10.0.0.5", SessionType::WebUi, 100)
            .unwrap();
        assert!(result.is_none());
        assert!(publisher.paths().is_empty());
    }

    #[test]
    fn test_create_rolls_back_on_publish_failure() {
        let (registry, publisher) = make_registry();
        publisher.set_fail_publish(true);

        let err = registry
            .create("alice", "10.0.0.5", SessionType::WebUi, 100)
            .unwrap_err();
        assert!(matches!(err, RegistryError::InternalFailure { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_then_lookup_fails() {
        let (registry, publisher) = make_registry();
        let id = create(&registry, "alice", SessionType::Interactive);

        registry.close(id).unwrap();
        assert!(matches!(
            registry.lookup(id),
            Err(RegistryError::InvalidArgument { .. })
        ));
        assert!(publisher.paths().is_empty());
    }

    #[test]
    fn test_close_unknown_id_fails() {
        let (registry, _) = make_registry();
        assert!(matches!(
            registry.close(SessionId::new(0xdead)),
            Err(RegistryError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_close_keeps_table_removal_on_retract_failure() {
        let (registry, publisher) = make_registry();
        let id = create(&registry, "alice", SessionType::Interactive);

        publisher.set_fail_retract(true);
        let err = registry.close(id).unwrap_err();
        assert!(matches!(err, RegistryError::InternalFailure { .. }));
        // Table consistency wins over publisher consistency.
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_all_returns_prior_size() {
        let (registry, publisher) = make_registry();
        create(&registry, "alice", SessionType::Interactive);
        create(&registry, "bob", SessionType::WebUi);
        create(&registry, "", SessionType::HostConsole);

        assert_eq!(registry.remove_all(), 3);
        assert!(registry.is_empty());
        assert!(publisher.paths().is_empty());
        assert_eq!(registry.remove_all(), 0);
    }

    #[test]
    fn test_remove_all_by_remote_address() {
        let (registry, _) = make_registry();
        registry
            .create("alice", "10.0.0.5", SessionType::Interactive, 1)
            .unwrap();
        registry
            .create("bob", "10.0.0.5", SessionType::WebUi, 2)
            .unwrap();
        registry
            .create("bob", "192.168.1.9", SessionType::WebUi, 3)
            .unwrap();

        assert_eq!(registry.remove_all_by_remote_address("10.0.0.5"), 2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_all_for_owner_skips_unowned() {
        let (registry, _) = make_registry();
        create(&registry, "alice", SessionType::Interactive);
        create(&registry, "alice", SessionType::WebUi);
        create(&registry, "", SessionType::WebUi);

        assert_eq!(registry.remove_all_for_owner("alice"), 2);
        assert_eq!(registry.len(), 1);
        // An unowned record matches no owner, not even an empty name.
        assert_eq!(registry.remove_all_for_owner(""), 0);
    }

    #[test]
    fn test_close_all_by_type() {
        let (registry, _) = make_registry();
        create(&registry, "alice", SessionType::Redfish);
        create(&registry, "bob", SessionType::Redfish);
        create(&registry, "bob", SessionType::Ipmi);

        assert_eq!(registry.close_all_by_type(SessionType::Redfish), 2);
        assert_eq!(registry.close_all_by_type(SessionType::Redfish), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_bulk_removal_survives_retract_failure() {
        let (registry, publisher) = make_registry();
        create(&registry, "alice", SessionType::Redfish);
        create(&registry, "bob", SessionType::Redfish);

        publisher.set_fail_retract(true);
        // Retraction failures are logged and skipped; the count reflects
        // table removals.
        assert_eq!(registry.close_all_by_type(SessionType::Redfish), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_session_path_and_id_round_trip() {
        let (registry, _) = make_registry();
        let id = create(&registry, "alice", SessionType::Interactive);

        let path = registry.session_path(id);
        assert!(path.starts_with("/sessiond/sessions/"));
        assert_eq!(SessionRegistry::id_from_path(&path).unwrap(), id);
    }

    #[test]
    fn test_set_session_metadata() {
        let (registry, publisher) = make_registry();
        let id = registry
            .create("", "", SessionType::WebUi, 50)
            .unwrap()
            .unwrap();

        registry
            .set_session_metadata(id, "bob", "172.16.0.2")
            .unwrap();
        let record = registry.lookup(id).unwrap();
        assert_eq!(record.owner(), Some("bob"));
        assert_eq!(record.remote_address, "172.16.0.2");
        assert_eq!(publisher.paths().len(), 1);
    }

    #[test]
    fn test_set_session_metadata_rejects_bad_input() {
        let (registry, _) = make_registry();
        let id = create(&registry, "alice", SessionType::WebUi);

        for (owner, remote) in [("bob", ""), ("", "10.0.0.1"), ("mallory", "10.0.0.1")] {
            assert!(matches!(
                registry.set_session_metadata(id, owner, remote),
                Err(RegistryError::InvalidArgument { .. })
            ));
        }
        assert!(matches!(
            registry.set_session_metadata(SessionId::new(0xbad), "bob", "10.0.0.1"),
            Err(RegistryError::InvalidArgument { .. })
        ));
    }
}
