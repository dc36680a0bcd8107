//! The lifecycle orchestrator: builds a pipeline from configuration and drives
//! it through `start`, `stop` and `terminate`.

mod core;

pub use self::core::Manager;
