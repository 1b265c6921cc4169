//! User directory backed by the host OS account database.
//!
//! Owner resolution and privilege tiers come from the accounts the host
//! already knows: an account that exists is a known user, and membership in
//! the configured administrative group maps to the `priv-admin` tier.
//! Lookup failures (NSS misconfiguration, unreachable backing store) are
//! reported as unreachable, never as "unknown user". The distinction is
//! what keeps a broken directory from quietly downgrading privileges.

use nix::unistd::{Group, User};
use sessiond_core::directory::{DirectoryError, PrivilegeLevel, UserDirectory};
use tracing::debug;

/// User directory over the host account database.
pub struct SystemUserDirectory {
    /// Group whose members hold the administrative tier.
    admin_group: String,
}

impl SystemUserDirectory {
    /// Creates a directory granting the administrative tier to members of
    /// `admin_group`.
    #[must_use]
    pub fn new(admin_group: impl Into<String>) -> Self {
        Self {
            admin_group: admin_group.into(),
        }
    }
}

impl UserDirectory for SystemUserDirectory {
    fn privilege_of(&self, username: &str) -> Result<PrivilegeLevel, DirectoryError> {
        let user = User::from_name(username)
            .map_err(|err| DirectoryError::Unreachable {
                reason: format!("account lookup failed: {err}"),
            })?
            .ok_or_else(|| DirectoryError::UnknownUser {
                username: username.to_string(),
            })?;

        let group = Group::from_name(&self.admin_group).map_err(|err| {
            DirectoryError::Unreachable {
                reason: format!("group lookup failed: {err}"),
            }
        })?;

        let is_admin = group.is_some_and(|group| {
            group.gid == user.gid || group.mem.iter().any(|member| member == username)
        });

        let level = if is_admin {
            PrivilegeLevel::Admin
        } else {
            PrivilegeLevel::User
        };
        debug!(user = username, tier = %level, "resolved account");
        Ok(level)
    }
}
