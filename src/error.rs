// In: src/error.rs

//! This module defines the single, unified error type for the entire meterline library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.

use thiserror::Error;

use crate::state::{Phase, Transition};

/// The error type components return from their constructors and worker loops.
/// Module internals are opaque to the orchestrator, so any error will do.
pub type ComponentError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum MeterlineError {
    // =========================================================================
    // === Construction Errors (fatal: no partially-built pipeline survives)
    // =========================================================================
    /// A settings section is malformed, missing a required field, or mistyped.
    #[error("Invalid configuration for component '{component}' at '{path}': {message}")]
    Configuration {
        component: String,
        path: String,
        message: String,
    },

    /// A component constructor failed (resource unavailable, permission denied, ...).
    #[error("Component #{index} ('{name}') failed to initialise: {source}")]
    ComponentInit {
        index: usize,
        name: String,
        #[source]
        source: ComponentError,
    },

    #[error("Cannot connect '{from}' to '{to}': {reason}")]
    Connection {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Failed to spawn the worker for component '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // === Lifecycle Errors (non-fatal: reported, state unchanged)
    // =========================================================================
    #[error("Transition '{transition}' rejected while {phase}")]
    TransitionRejected { transition: Transition, phase: Phase },

    #[error("A pipeline manager instance already exists")]
    AlreadyExists,

    #[error("No pipeline manager instance exists")]
    Missing,

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the underlying I/O subsystem (e.g., log file not writable).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically while parsing the configuration text.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error for Python FFI (Foreign Function Interface) operations.
    #[error("FFI operation failed: {0}")]
    FfiError(String),
}

impl MeterlineError {
    /// Returns `true` for errors raised while building a manager. These always
    /// unwind fully; the caller may retry with adjusted input.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            MeterlineError::Configuration { .. }
                | MeterlineError::ComponentInit { .. }
                | MeterlineError::Connection { .. }
                | MeterlineError::Spawn { .. }
                | MeterlineError::SerdeJson(_)
        )
    }
}

// =============================================================================
// === Manual `From` Implementations ===
// =============================================================================

#[cfg(feature = "python")]
impl From<pyo3::PyErr> for MeterlineError {
    fn from(err: pyo3::PyErr) -> Self {
        MeterlineError::FfiError(err.to_string())
    }
}

#[cfg(feature = "python")]
impl From<MeterlineError> for pyo3::PyErr {
    fn from(err: MeterlineError) -> pyo3::PyErr {
        pyo3::exceptions::PyValueError::new_err(err.to_string())
    }
}
