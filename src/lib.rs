//! Lyra - watershed catchment tracing and data
//!
//! Builds the regional subbasin drainage graph, traces catchments upstream
//! and downstream, serves the catchment layer as GeoJSON or TopoJSON and
//! queries per-catchment metrics. Every expensive step goes through a
//! memoizing function cache.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod hydstra;
pub mod metrics;
pub mod rsb;
pub mod source;
pub mod spatial;
pub mod tasks;
pub mod ui;

pub use error::{LyraError, LyraResult};
