//! This file is the root of the `meterline` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of our library (`pipeline`, `state`, etc.)
//!     so the Rust compiler knows they exist.
//! 2.  Re-exporting the types an embedder needs to drive a pipeline.
//! 3.  Defining the `#[pymodule]` entry point when built with the `python` feature.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//==================================================================================
// 1. Module Declarations
//==================================================================================
#[doc(hidden)]
pub use log as __log;

#[macro_use]
pub mod observability; // Make macros available throughout the crate

pub mod bridge;
pub mod components;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod state;

#[cfg(feature = "python")]
mod ffi;

//==================================================================================
// 2. Public Surface
//==================================================================================
pub use bridge::{InstanceStatus, Wrapper};
pub use config::{HostEnvironment, LoggingSettings, ManagerSettings};
pub use error::{ComponentError, MeterlineError};
pub use pipeline::{Blueprint, Manager, Module, Record, Stage, StageContext};
pub use state::{Phase, StateHandle};

//==================================================================================
// 3. Python Module Definition
//==================================================================================
#[cfg(feature = "python")]
use pyo3::prelude::*;

/// The `meterline` Python module.
#[cfg(feature = "python")]
#[pymodule]
fn meterline(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // --- Classes ---
    m.add_class::<ffi::python::PyPipelineService>()?;

    // --- Expose the custom error type ---
    m.add(
        "MeterlineError",
        m.py().get_type_bound::<pyo3::exceptions::PyValueError>(),
    )?;

    // --- Expose version string as a module attribute ---
    m.add("__version__", VERSION)?;

    // --- Logging ---
    m.add_function(wrap_pyfunction!(ffi::python::enable_verbose_logging_py, m)?)?;

    Ok(())
}
