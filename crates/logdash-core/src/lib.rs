//! logdash-core: shared domain model for the logdash dashboard client.
//!
//! Holds the pieces every logdash crate agrees on: configuration loading,
//! the immutable request context captured by each operation, the aggregate
//! summary contract returned by the analysis backend, and client address
//! classification used by enrichment.

pub mod address;
pub mod config;
pub mod context;
pub mod summary;

/// Crate identity label used for smoke tests.
pub fn crate_label() -> &'static str {
    "logdash-core"
}
