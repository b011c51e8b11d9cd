//! `spanmark` crate (library surface).
//!
//! The primary entrypoint for end users is the `spanmark` binary. This module re-exports the
//! core types and the engine so embedders don't depend on internal crate layout.

pub use spanmark_core as core;
pub use spanmark_engine as engine;
