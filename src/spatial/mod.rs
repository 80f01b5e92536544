//! Spatial responses over the catchment polygon layer
//!
//! The layer is filtered by bounding box, watershed and catchment id, and
//! served either as GeoJSON or as simplified, quantized TopoJSON. Each stage
//! is cached under its own parameters.

pub mod filter;
pub mod service;
pub mod topo;

use crate::error::LyraError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub use filter::{filter_features, SpatialFilter};
pub use service::{catchidns_upstream_of, SpatialRequest, SpatialService};
pub use topo::TopoOptions;

/// Output encodings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpatialFormat {
    GeoJson,
    #[default]
    TopoJson,
}

impl FromStr for SpatialFormat {
    type Err = LyraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "geojson" => Ok(Self::GeoJson),
            "topojson" => Ok(Self::TopoJson),
            _ => Err(LyraError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for SpatialFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GeoJson => write!(f, "geojson"),
            Self::TopoJson => write!(f, "topojson"),
        }
    }
}
