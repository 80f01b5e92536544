//! Catchment metrics
//!
//! Monthly values per catchment and variable live in `DTMetrics`; variable
//! codes are named in `DTMetricsCategories`. [`MetricsService`] resolves a
//! [`MetricsRequest`] into a parameterized query, optionally widening the
//! catchment set to everything upstream.

pub mod query;
pub mod service;
pub mod sqlite;

use crate::error::LyraResult;
use async_trait::async_trait;

pub use query::{
    aggregate, AggregateRecord, Aggregation, Category, Granularity, MetricRecord, MetricRow,
    MetricsQuery, YearMonth,
};
pub use service::{MetricsRequest, MetricsService};
pub use sqlite::SqliteStore;

/// Relational store holding the metrics tables
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Every known variable
    async fn categories(&self) -> LyraResult<Vec<Category>>;

    /// Rows matching `query`, ordered by catchment, variable, year, month
    async fn fetch(&self, query: &MetricsQuery) -> LyraResult<Vec<MetricRow>>;

    /// Identity used in cache keys
    fn identity(&self) -> String;
}
