//! End-to-end coverage of the registry operation surface.
//!
//! Exercises the engine with in-memory collaborators: every create returns
//! a fresh non-sentinel identifier, closes are gated by ownership and
//! privilege, bulk removals report exact counts, and identifier text forms
//! round-trip.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sessiond_core::bus::{BusPublisher, PublishError};
use sessiond_core::directory::{
    DirectoryError, InMemoryUserDirectory, PrivilegeLevel, UserDirectory,
};
use sessiond_core::{RegistryError, SessionId, SessionRecord, SessionRegistry, SessionType};

/// Publisher double that records the currently published addresses.
#[derive(Default)]
struct RecordingPublisher {
    paths: Mutex<Vec<String>>,
}

impl RecordingPublisher {
    fn published(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

impl BusPublisher for RecordingPublisher {
    fn publish(&self, path: &str, _record: &SessionRecord) -> Result<(), PublishError> {
        let mut paths = self.paths.lock().unwrap();
        if !paths.iter().any(|p| p == path) {
            paths.push(path.to_string());
        }
        Ok(())
    }

    fn retract(&self, path: &str) -> Result<(), PublishError> {
        self.paths.lock().unwrap().retain(|p| p != path);
        Ok(())
    }
}

/// Directory double that can be cut off mid-test, simulating an outage
/// after sessions were created.
struct ToggleDirectory {
    inner: InMemoryUserDirectory,
    down: AtomicBool,
}

impl ToggleDirectory {
    fn new(inner: InMemoryUserDirectory) -> Self {
        Self {
            inner,
            down: AtomicBool::new(false),
        }
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

impl UserDirectory for ToggleDirectory {
    fn privilege_of(&self, username: &str) -> Result<PrivilegeLevel, DirectoryError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unreachable {
                reason: "directory service is down".to_string(),
            });
        }
        self.inner.privilege_of(username)
    }
}

fn make_directory() -> Arc<InMemoryUserDirectory> {
    let directory = Arc::new(InMemoryUserDirectory::new());
    directory.insert("alice", PrivilegeLevel::User);
    directory.insert("bob", PrivilegeLevel::User);
    directory.insert("admin", PrivilegeLevel::Admin);
    directory
}

fn make_registry() -> (Arc<SessionRegistry>, Arc<RecordingPublisher>) {
    let publisher = Arc::new(RecordingPublisher::default());
    let registry = Arc::new(SessionRegistry::new(
        "sessiond",
        "/sessiond/sessions",
        make_directory(),
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
fn created_ids_are_unique_and_never_the_sentinel() {
    let (registry, _) = make_registry();

    let mut ids = Vec::new();
    for _ in 0..16 {
        let id = create(&registry, "alice", SessionType::Interactive);
        assert!(id.is_valid());
        assert!(!ids.contains(&id), "identifier reused among live sessions");
        ids.push(id);
    }
    assert_eq!(registry.len(), 16);
}

#[test]
fn close_then_lookup_always_fails_invalid_argument() {
    let (registry, _) = make_registry();
    let id = create(&registry, "alice", SessionType::Interactive);

    registry.close(id).unwrap();
    assert!(matches!(
        registry.lookup(id),
        Err(RegistryError::InvalidArgument { .. })
    ));
    // Closing again also reports the absent id.
    assert!(matches!(
        registry.close(id),
        Err(RegistryError::InvalidArgument { .. })
    ));
}

#[test]
fn hex_round_trip_through_bus_addresses() {
    let (registry, publisher) = make_registry();
    let id = create(&registry, "alice", SessionType::Redfish);

    let path = registry.session_path(id);
    assert_eq!(publisher.published(), vec![path.clone()]);
    assert_eq!(SessionRegistry::id_from_path(&path).unwrap(), id);
}

#[test]
fn own_session_excluded_from_user_bulk_close() {
    // A caller closing its user's sessions of one type never counts its
    // own session.
    let (registry, _) = make_registry();
    let caller = create(&registry, "alice", SessionType::Interactive);

    let closed = registry
        .close_user_sessions_by_type(caller, SessionType::Interactive, true)
        .unwrap();
    assert_eq!(closed, 0);
    assert!(registry.lookup(caller).is_ok());

    let second = create(&registry, "alice", SessionType::Interactive);
    let closed = registry
        .close_user_sessions_by_type(caller, SessionType::Interactive, true)
        .unwrap();
    assert_eq!(closed, 1);
    assert!(registry.lookup(caller).is_ok());
    assert!(registry.lookup(second).is_err());
}

#[test]
fn user_bulk_close_ignores_other_owners_and_types() {
    let (registry, _) = make_registry();
    let caller = create(&registry, "alice", SessionType::Interactive);
    create(&registry, "alice", SessionType::WebUi);
    create(&registry, "bob", SessionType::Interactive);

    let closed = registry
        .close_user_sessions_by_type(caller, SessionType::Interactive, true)
        .unwrap();
    assert_eq!(closed, 0);
    assert_eq!(registry.len(), 3);
}

#[test]
fn privileged_caller_may_widen_user_bulk_close() {
    let (registry, _) = make_registry();
    let caller = create(&registry, "admin", SessionType::Interactive);
    create(&registry, "alice", SessionType::Interactive);
    create(&registry, "bob", SessionType::Interactive);
    create(&registry, "bob", SessionType::WebUi);

    let closed = registry
        .close_user_sessions_by_type(caller, SessionType::Interactive, false)
        .unwrap();
    assert_eq!(closed, 2);
    assert!(registry.lookup(caller).is_ok());
}

#[test]
fn owned_only_bulk_close_never_consults_the_directory() {
    // Privilege is evaluated lazily: with owned_only the operation must
    // succeed even when every directory lookup fails.
    let directory = Arc::new(ToggleDirectory::new({
        let inner = InMemoryUserDirectory::new();
        inner.insert("alice", PrivilegeLevel::User);
        inner
    }));
    let publisher = Arc::new(RecordingPublisher::default());
    let registry = SessionRegistry::new(
        "sessiond",
        "/sessiond/sessions",
        Arc::clone(&directory) as Arc<dyn UserDirectory>,
        publisher as Arc<dyn BusPublisher>,
    );
    let caller = create(&registry, "alice", SessionType::Interactive);
    create(&registry, "alice", SessionType::Interactive);

    directory.set_down(true);
    assert_eq!(
        registry
            .close_user_sessions_by_type(caller, SessionType::Interactive, true)
            .unwrap(),
        1
    );
}

#[test]
fn user_bulk_close_with_unknown_caller_fails() {
    let (registry, _) = make_registry();
    assert!(matches!(
        registry.close_user_sessions_by_type(SessionId::new(0xbad), SessionType::WebUi, true),
        Err(RegistryError::InvalidArgument { .. })
    ));
}

#[test]
fn wide_user_bulk_close_with_broken_directory_fails_hard() {
    let directory = Arc::new(ToggleDirectory::new({
        let inner = InMemoryUserDirectory::new();
        inner.insert("alice", PrivilegeLevel::User);
        inner
    }));
    let publisher = Arc::new(RecordingPublisher::default());
    let registry = SessionRegistry::new(
        "sessiond",
        "/sessiond/sessions",
        Arc::clone(&directory) as Arc<dyn UserDirectory>,
        publisher as Arc<dyn BusPublisher>,
    );
    let caller = create(&registry, "alice", SessionType::Interactive);

    // The wide candidate set needs a privilege verdict; a broken directory
    // must surface as a hard failure, never as "not privileged".
    directory.set_down(true);
    assert!(matches!(
        registry.close_user_sessions_by_type(caller, SessionType::Interactive, false),
        Err(RegistryError::InternalFailure { .. })
    ));
}

#[test]
fn remove_all_counts_exactly_and_empties() {
    let (registry, publisher) = make_registry();
    for _ in 0..5 {
        create(&registry, "alice", SessionType::WebUi);
    }

    assert_eq!(registry.remove_all(), 5);
    assert!(registry.is_empty());
    assert!(publisher.published().is_empty());
}
