// In: src/bridge/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Bridge Layer
// ====================================================================================
//
// The `bridge` is the boundary between an embedding host and the pipeline engine.
// Hosts never see a `Result`, a `Phase` or a panic: every call returns a boolean
// or a string, and every failure is logged.
//
//   1. [Host binding (ffi::python, optional)] -> one `Wrapper` behind a mutex
//         |
//   2. [Wrapper (wrapper)]                    -> at most one `Manager`, guard checks
//         |
//   3. [Manager (pipeline::orchestrator)]     -> the typed lifecycle
//
// ====================================================================================

pub(crate) mod format;
pub mod wrapper;

pub use wrapper::Wrapper;

use crate::state::Phase;

/// The externally visible state of a wrapper's instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceStatus {
    Missing,
    Idle,
    Started,
    Stopped,
    Terminated,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceStatus::Missing => format::MISSING,
            InstanceStatus::Idle => Phase::Idle.as_str(),
            InstanceStatus::Started => Phase::Started.as_str(),
            InstanceStatus::Stopped => Phase::Stopped.as_str(),
            InstanceStatus::Terminated => Phase::Terminated.as_str(),
        }
    }
}

impl From<Phase> for InstanceStatus {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Idle => InstanceStatus::Idle,
            Phase::Started => InstanceStatus::Started,
            Phase::Stopped => InstanceStatus::Stopped,
            Phase::Terminated => InstanceStatus::Terminated,
        }
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
