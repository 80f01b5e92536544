//! Configuration schema for Lyra
//!
//! Configuration is stored at `~/.config/lyra/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const HOUR: u64 = 3600;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Function cache settings
    pub cache: CacheConfig,

    /// Regional subbasin topology settings
    pub rsb: RsbConfig,

    /// Spatial layer settings
    pub spatial: SpatialConfig,

    /// Metrics store settings
    pub metrics: MetricsConfig,

    /// Hydstra timeseries API settings
    pub hydstra: HydstraConfig,

    /// Background task settings
    pub tasks: TasksConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Cache backing store selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local memory
    Memory,
    /// One file per entry under `cache.dir`
    File,
    /// No backing store; every call recomputes
    None,
}

/// Function cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Global caching switch (default: true)
    pub enabled: bool,

    /// Backing store
    pub backend: CacheBackend,

    /// Directory for the file backend (defaults to the state dir)
    pub dir: Option<PathBuf>,

    /// TTL applied when a caller does not pick one
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::File,
            dir: None,
            default_ttl_secs: 24 * HOUR,
        }
    }
}

/// Regional subbasin topology configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RsbConfig {
    /// Topology file (GeoJSON or CSV)
    pub source: Option<PathBuf>,

    /// Column holding the catchment id
    pub source_column: String,

    /// Column holding the downstream catchment id
    pub target_column: String,

    /// Downstream id meaning "drains to the outlet"; unset disables sentinel handling
    pub terminal_id: Option<i64>,

    /// Watershed label attached to the terminal node
    pub terminal_label: String,

    /// Graph lifetime in the cache (unset = until flushed)
    pub graph_ttl_secs: Option<u64>,

    /// Trace lifetime in the cache
    pub trace_ttl_secs: u64,

    /// Trace response envelope lifetime in the cache
    pub response_ttl_secs: u64,
}

impl Default for RsbConfig {
    fn default() -> Self {
        Self {
            source: None,
            source_column: "CatchIDN".to_string(),
            target_column: "DwnCatchIDN".to_string(),
            terminal_id: Some(0),
            terminal_label: "Ocean".to_string(),
            graph_ttl_secs: None,
            trace_ttl_secs: 6 * HOUR,
            response_ttl_secs: HOUR,
        }
    }
}

impl RsbConfig {
    pub fn graph_ttl(&self) -> Option<Duration> {
        self.graph_ttl_secs.map(Duration::from_secs)
    }

    pub fn trace_ttl(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.trace_ttl_secs))
    }

    pub fn response_ttl(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.response_ttl_secs))
    }
}

/// Spatial layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Catchment polygons (GeoJSON)
    pub source: Option<PathBuf>,

    /// Property holding the catchment id
    pub id_column: String,

    /// Property holding the watershed name
    pub watershed_column: String,

    /// Default bounding box: xmin, ymin, xmax, ymax
    pub default_bbox: [f64; 4],

    /// Default simplification tolerance for topojson output
    pub toposimplify: f64,

    /// Default quantization grid size for topojson output
    pub topoquantize: f64,

    /// Lifetime of raw and filtered layers
    pub raw_ttl_secs: u64,

    /// Lifetime of assembled responses
    pub response_ttl_secs: u64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            source: None,
            id_column: "CatchIDN".to_string(),
            watershed_column: "Watershed".to_string(),
            // Aliso Creek
            default_bbox: [-117.78, 33.45, -117.58, 33.72],
            toposimplify: 0.0001,
            topoquantize: 1e6,
            raw_ttl_secs: 24 * HOUR,
            response_ttl_secs: 6 * HOUR,
        }
    }
}

impl SpatialConfig {
    pub fn raw_ttl(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.raw_ttl_secs))
    }

    pub fn response_ttl(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.response_ttl_secs))
    }
}

/// Metrics store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// SQLite database holding `DTMetrics` and `DTMetricsCategories`
    pub database: Option<PathBuf>,

    /// Query result lifetime in the cache
    pub ttl_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            database: None,
            ttl_secs: 6 * HOUR,
        }
    }
}

impl MetricsConfig {
    pub fn ttl(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.ttl_secs))
    }
}

/// Hydstra API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HydstraConfig {
    /// Service endpoint
    pub base_url: String,

    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for HydstraConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Background task configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TasksConfig {
    /// How long a caller waits before receiving a pending handle
    pub wait_ms: u64,

    /// Completion check interval while waiting
    pub poll_interval_ms: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            wait_ms: 200,
            poll_interval_ms: 50,
        }
    }
}
