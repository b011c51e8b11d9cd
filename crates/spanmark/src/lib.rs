//! Public facade crate for `spanmark`.
//!
//! This crate contains no parsing or shellout logic.
//! It re-exports the backend-agnostic types/traits from `spanmark-core`.

pub use spanmark_core::*;
