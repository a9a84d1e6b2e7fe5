//! Shared types and index format for widepack.
//!
//! A package index (`<WideIndex>`) is a cumulative XML document listing
//! one `Package` record per packaging run. This crate holds the in-memory
//! model of a record and its XML rendering; discovery, introspection and
//! persistence live in `widepack-core`.

pub mod arch;
pub mod types;
pub mod xml;

// Re-exports
pub use arch::*;
pub use types::*;
pub use xml::{INDEX_ROOT, write_package};
