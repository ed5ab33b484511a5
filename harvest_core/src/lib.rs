//! Shared primitives for the tile-harvest engine: the error taxonomy,
//! typed run configuration, the catalog data model and its on-disk paths, a
//! small dynamic-JSON walker, CSV ingestion, and progress reporting.
//!
//! Everything here is pure or filesystem-local; the networked pieces
//! (proxy allocation, session pools, retry/rotation) live in `harvest_pool`.

pub mod config;
pub mod csv_input;
pub mod error;
pub mod http;
pub mod json_walk;
pub mod model;
pub mod progress;

pub use config::HarvestConfig;
pub use error::HarvestError;
pub use model::{write_atomic, write_completion_marker, ArtistRecord, Family, RawdataPaths, Variant, Work};
