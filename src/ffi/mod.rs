// In: src/ffi/mod.rs

//! Host bindings. Compiled only with the `python` feature.

pub mod python;
