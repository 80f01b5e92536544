//! Error types for Lyra
//!
//! All modules use `LyraResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Lyra operations
pub type LyraResult<T> = Result<T, LyraError>;

/// All errors that can occur in Lyra
#[derive(Error, Debug)]
pub enum LyraError {
    // Topology errors
    #[error("Malformed catchment record at row {row}: missing column `{column}`")]
    MalformedRecord { column: String, row: usize },

    #[error("Invalid value in column `{column}` at row {row}: {reason}")]
    InvalidRecordValue {
        column: String,
        row: usize,
        reason: String,
    },

    // Request errors
    #[error("Unsupported output format: `{0}`")]
    UnsupportedFormat(String),

    #[error("Unknown variable: `{0}`")]
    UnknownVariable(String),

    #[error("Unknown aggregation: `{0}`")]
    UnknownAggregation(String),

    #[error("Invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("Invalid date `{0}`, expected YYYY-MM")]
    InvalidDate(String),

    // Query errors
    #[error("Bad Query Filters: {filters}")]
    EmptyResult { filters: serde_json::Value },

    // External service errors
    #[error("Hydstra error {code}: {message}")]
    Hydstra { code: i64, message: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    // Cache errors
    #[error("Cache store unavailable: {0}")]
    CacheUnavailable(String),

    // Task errors
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No {0} source configured")]
    SourceNotConfigured(&'static str),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LyraError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a malformed record error
    pub fn malformed(column: impl Into<String>, row: usize) -> Self {
        Self::MalformedRecord {
            column: column.into(),
            row,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Hydstra { .. } | Self::Http(_) | Self::CacheUnavailable(_)
        )
    }

    /// Whether the error was caused by caller input rather than a failure
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_)
                | Self::UnknownVariable(_)
                | Self::UnknownAggregation(_)
                | Self::InvalidBbox(_)
                | Self::InvalidDate(_)
                | Self::EmptyResult { .. }
        )
    }

    /// Structured identifying data carried by the error, if any
    pub fn data(&self) -> Option<serde_json::Value> {
        match self {
            Self::EmptyResult { filters } => Some(filters.clone()),
            Self::MalformedRecord { column, row } => {
                Some(serde_json::json!({ "column": column, "row": row }))
            }
            Self::Hydstra { code, message } => {
                Some(serde_json::json!({ "error_num": code, "error_msg": message }))
            }
            _ => None,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnsupportedFormat(_) => Some("Use one of: geojson, topojson"),
            Self::UnknownAggregation(_) => Some("Use one of: sum, mean, min, max"),
            Self::UnknownVariable(_) => Some("List known variables with: lyra metrics --list-variables"),
            Self::EmptyResult { .. } => Some("No data for this combination of filters"),
            Self::SourceNotConfigured(_) => Some("Pass the file on the command line or set it in the config file (lyra config path)"),
            _ => None,
        }
    }
}
