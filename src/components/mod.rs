// In: src/components/mod.rs

//! The built-in module catalogue.
//!
//! Every module lives in its own file next to its settings struct. The
//! diagnostics stage is not listed here: it always occupies index 0 and is
//! owned by the orchestrator (see `crate::observability::Diagnostics`).

pub mod meter;
pub mod process_host;
pub mod recorder;

pub use meter::{Meter, MeterSettings, Probe};
pub use process_host::{ProcessHost, ProcessHostSettings};
pub use recorder::{RecordFormat, Recorder, RecorderSettings};

use crate::pipeline::Blueprint;

impl Blueprint {
    /// `meter → process_host → recorder`, indexed 1 to 3.
    pub fn standard() -> Self {
        Blueprint::default()
            .then::<Meter>()
            .then::<ProcessHost>()
            .then::<Recorder>()
    }
}
