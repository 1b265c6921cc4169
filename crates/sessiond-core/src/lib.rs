//! sessiond-core - Session Registry Engine Library
//!
//! This library provides the core functionality of the sessiond service:
//! the in-memory session table, identifier generation, ownership and
//! privilege enforcement, and the liveness-eviction pass that reclaims
//! sessions whose owning service process has died.
//!
//! The registry is the single source of truth for session state. The bus
//! transport, the remote user directory, and the process-existence check are
//! consumed through narrow capability traits ([`bus::BusPublisher`],
//! [`directory::UserDirectory`], [`process::ProcessProbe`]) so that the
//! engine carries no transport binding of its own.
//!
//! # Modules
//!
//! - [`config`]: Service configuration files (TOML)
//! - [`session`]: Session identifiers, classification tags, and records
//! - [`identifier`]: Collision-avoiding session identifier generation
//! - [`directory`]: User-directory capability and authorization policy
//! - [`process`]: Process-existence probing for the liveness sweep
//! - [`bus`]: The publish/retract contract consumed by the registry
//! - [`registry`]: The session registry and its operation surface
//! - [`error`]: Error taxonomy shared by all registry operations

pub mod bus;
pub mod config;
pub mod directory;
pub mod error;
pub mod identifier;
pub mod process;
pub mod registry;
pub mod session;

pub use error::{RegistryError, RegistryResult};
pub use registry::SessionRegistry;
pub use session::{SessionId, SessionRecord, SessionType};
