//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Lyra - watershed catchment tracing and data
///
/// Traces catchments up and down the drainage network, serves the
/// catchment layer as GeoJSON or TopoJSON, and queries catchment metrics,
/// memoizing every expensive step.
#[derive(Parser, Debug)]
#[command(name = "lyra")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "LYRA_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Trace catchments upstream or downstream of one catchment
    Trace(TraceArgs),

    /// Render the catchment layer
    Spatial(SpatialArgs),

    /// Query catchment metrics
    Metrics(MetricsArgs),

    /// Fetch a timeseries trace from the Hydstra service
    Hydstra(HydstraArgs),

    /// Manage the function cache
    Cache(CacheArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Trace direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TraceDirection {
    Upstream,
    Downstream,
}

/// Arguments for the trace command
#[derive(Parser, Debug)]
pub struct TraceArgs {
    /// Direction to trace
    #[arg(value_enum)]
    pub direction: TraceDirection,

    /// Catchment id to start from
    pub catchidn: i64,

    /// Topology file (GeoJSON or CSV); defaults to rsb.source
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "json")]
    pub format: OutputFormat,

    /// Print the full response envelope instead of the bare id list
    #[arg(long, conflicts_with = "format")]
    pub envelope: bool,
}

/// Arguments for the spatial command
#[derive(Parser, Debug)]
pub struct SpatialArgs {
    /// Output format: topojson or geojson
    #[arg(short, long, default_value = "topojson")]
    pub format: String,

    /// Bounding box as xmin,ymin,xmax,ymax; defaults to spatial.default_bbox
    #[arg(long, allow_hyphen_values = true)]
    pub bbox: Option<String>,

    /// Keep only these watersheds (repeatable)
    #[arg(long)]
    pub watershed: Vec<String>,

    /// Keep only these catchments (repeatable)
    #[arg(long)]
    pub catchidn: Vec<i64>,

    /// Add every catchment upstream of this one to the catchment filter
    #[arg(long)]
    pub upstream_of: Option<i64>,

    /// Simplification tolerance for topojson
    #[arg(long)]
    pub toposimplify: Option<f64>,

    /// Quantization grid size for topojson
    #[arg(long)]
    pub topoquantize: Option<f64>,

    /// Print the attribute table instead of geometry
    #[arg(long, conflicts_with_all = ["format", "bbox", "toposimplify", "topoquantize"])]
    pub table: bool,

    /// Catchment polygon file; defaults to spatial.source
    #[arg(short, long)]
    pub source: Option<PathBuf>,
}

/// Arguments for the metrics command
#[derive(Parser, Debug)]
pub struct MetricsArgs {
    /// Catchment ids (repeatable; none means all)
    #[arg(long)]
    pub catchidn: Vec<i64>,

    /// Variable name
    #[arg(long, required_unless_present = "list_variables")]
    pub variable: Option<String>,

    /// First month, YYYY-MM
    #[arg(long)]
    pub start: Option<String>,

    /// Last month, YYYY-MM
    #[arg(long)]
    pub end: Option<String>,

    /// Aggregation: sum, mean, min or max
    #[arg(long)]
    pub agg: Option<String>,

    /// Aggregation period: month or year
    #[arg(long, default_value = "month")]
    pub by: String,

    /// Include every catchment upstream of the given ones
    #[arg(long)]
    pub upstream: bool,

    /// Metrics database; defaults to metrics.database
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Topology file for --upstream; defaults to rsb.source
    #[arg(long)]
    pub rsb_source: Option<PathBuf>,

    /// List known variables and exit
    #[arg(long)]
    pub list_variables: bool,
}

/// Arguments for the hydstra command
#[derive(Parser, Debug)]
pub struct HydstraArgs {
    /// Site id
    pub site: String,

    /// Source variable
    pub varfrom: String,

    /// Target variable; defaults to varfrom
    #[arg(long)]
    pub varto: Option<String>,

    /// First day, YYYY-MM-DD
    #[arg(long)]
    pub start: Option<String>,

    /// Last day, YYYY-MM-DD
    #[arg(long)]
    pub end: Option<String>,

    /// Variable to retry with when varfrom has no data
    #[arg(long)]
    pub fallback_varfrom: Option<String>,

    /// Service endpoint; defaults to hydstra.base_url
    #[arg(long)]
    pub base_url: Option<String>,

    /// Milliseconds to wait before reporting the task as pending; defaults to tasks.wait_ms
    #[arg(long)]
    pub wait_ms: Option<u64>,

    /// Print the pending envelope instead of waiting for the trace
    #[arg(long)]
    pub no_wait: bool,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Drop every cached entry
    Flush,

    /// Turn caching on
    Enable,

    /// Turn caching off; every call recomputes
    Disable,

    /// Show backend and health
    Status,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Output format for id lists
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// JSON array
    Json,
    /// One id per line
    Plain,
}
