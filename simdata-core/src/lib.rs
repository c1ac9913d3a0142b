//! simdata-core: Canonical telemetry reading, field catalog, and store.
//!
//! No async, no vendor I/O. This crate is the shared core used by both
//! `simdata-feeder` (sources + poller) and `simdata-server` (HTTP export).

pub mod catalog;
pub mod config;
pub mod store;
pub mod types;

// Re-export commonly used types at crate root
pub use catalog::{Catalog, Encoding, FieldSpec, RawValue};
pub use store::ReadingStore;
pub use types::*;
