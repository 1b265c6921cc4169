//! Process-existence probing for the liveness sweep.
//!
//! The sweep needs exactly one fact per session: does the owning service
//! process still exist? The probe is an existence check, not a signal: no
//! process is ever touched, let alone terminated, by this service.

use std::path::Path;

/// Capability for checking whether a process currently exists.
pub trait ProcessProbe: Send + Sync {
    /// Returns `true` if a process with the given PID is currently alive.
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by procfs.
///
/// A process exists iff its `/proc/<pid>` directory does. PID reuse between
/// sweeps makes a stale-positive possible in principle; the sweep tolerates
/// it since such a session is removed once the recycled PID exits.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcfsProbe;

impl ProcfsProbe {
    /// Creates a procfs probe.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ProcessProbe for ProcfsProbe {
    fn is_alive(&self, pid: u32) -> bool {
        Path::new("/proc").join(pid.to_string()).exists()
    }
}
