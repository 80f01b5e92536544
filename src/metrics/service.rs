//! Cached metrics queries with optional upstream expansion

use crate::cache::{CacheClient, CacheKey};
use crate::config::MetricsConfig;
use crate::error::{LyraError, LyraResult};
use crate::metrics::query::{
    aggregate, Aggregation, Category, Granularity, MetricRecord, MetricsQuery, YearMonth,
};
use crate::metrics::MetricsStore;
use crate::rsb::{Direction, RsbService};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// "Variable X for catchments Y over dates Z"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRequest {
    /// Empty means every catchment
    pub catchidns: Vec<i64>,
    pub variable: String,
    /// Inclusive lower bound
    pub start: Option<YearMonth>,
    /// Inclusive upper bound
    pub end: Option<YearMonth>,
    /// Raw records when unset
    pub aggregation: Option<Aggregation>,
    pub granularity: Granularity,
    /// Expand `catchidns` to everything upstream of each
    pub trace_upstream: bool,
}

impl MetricsRequest {
    pub fn new(catchidns: Vec<i64>, variable: impl Into<String>) -> Self {
        Self {
            catchidns,
            variable: variable.into(),
            start: None,
            end: None,
            aggregation: None,
            granularity: Granularity::default(),
            trace_upstream: false,
        }
    }

    fn in_window(&self, year: i32, month: u32) -> bool {
        let at = YearMonth { year, month };
        self.start.is_none_or(|start| at >= start) && self.end.is_none_or(|end| at <= end)
    }
}

/// Metrics over a store, keyed through the function cache
#[derive(Clone)]
pub struct MetricsService {
    cache: CacheClient,
    store: Arc<dyn MetricsStore>,
    rsb: Option<RsbService>,
    config: MetricsConfig,
}

impl MetricsService {
    pub fn new(cache: CacheClient, store: Arc<dyn MetricsStore>, config: MetricsConfig) -> Self {
        Self {
            cache,
            store,
            rsb: None,
            config,
        }
    }

    /// Enable `trace_upstream` requests
    pub fn with_rsb(mut self, rsb: RsbService) -> Self {
        self.rsb = Some(rsb);
        self
    }

    /// Variable catalogue, cached until the cache is flushed
    pub async fn categories(&self) -> LyraResult<Vec<Category>> {
        let key = CacheKey::new("fetch_categories").kwarg("store", &self.store.identity())?;
        let bytes = self
            .cache
            .get_or_compute(&key, None, || self.compute_categories())
            .await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn compute_categories(&self) -> LyraResult<Vec<u8>> {
        let categories = self.store.categories().await?;
        Ok(serde_json::to_vec(&categories)?)
    }

    /// Catchments to query: the request's ids, or the union of their upstream traces
    pub async fn expand_catchidns(&self, request: &MetricsRequest) -> LyraResult<Vec<i64>> {
        if !request.trace_upstream {
            let mut ids = request.catchidns.clone();
            ids.sort_unstable();
            ids.dedup();
            return Ok(ids);
        }
        let rsb = self.rsb.as_ref().ok_or(LyraError::SourceNotConfigured("rsb"))?;

        let traces = join_all(
            request
                .catchidns
                .iter()
                .map(|id| rsb.trace_ids(*id, Direction::Upstream)),
        )
        .await;

        let mut ids = BTreeSet::new();
        for trace in traces {
            ids.extend(trace?);
        }
        debug!(
            "Expanded {} catchments to {} upstream",
            request.catchidns.len(),
            ids.len()
        );
        Ok(ids.into_iter().collect())
    }

    /// JSON records answering `request`
    ///
    /// Fails with `EmptyResult` carrying the filters when nothing matched.
    pub async fn query_metrics(&self, request: &MetricsRequest) -> LyraResult<Vec<u8>> {
        let key = CacheKey::new("dt_metrics")
            .kwarg("store", &self.store.identity())?
            .kwarg("request", request)?;
        self.cache
            .get_or_compute(&key, self.config.ttl(), || self.compute_metrics(request))
            .await
    }

    async fn compute_metrics(&self, request: &MetricsRequest) -> LyraResult<Vec<u8>> {
        let categories = self.categories().await?;
        let code = categories
            .iter()
            .find(|c| c.variable_name == request.variable)
            .map(|c| c.variable)
            .ok_or_else(|| LyraError::UnknownVariable(request.variable.clone()))?;
        let names: HashMap<i64, &str> = categories
            .iter()
            .map(|c| (c.variable, c.variable_name.as_str()))
            .collect();

        let catchidns = self.expand_catchidns(request).await?;
        let mut query = MetricsQuery::new().variables([code]);
        if !catchidns.is_empty() {
            query = query.catchidns(catchidns);
        }
        if let (Some(start), Some(end)) = (request.start, request.end) {
            query = query.years((start.year..=end.year).map(i64::from));
            if start.year == end.year {
                query = query.months((start.month..=end.month).map(i64::from));
            }
        }

        let records: Vec<MetricRecord> = self
            .store
            .fetch(&query)
            .await?
            .into_iter()
            .filter(|r| request.in_window(r.year, r.month))
            .map(|r| MetricRecord {
                catchidn: r.catchidn,
                variable: names.get(&r.variable).map_or_else(|| r.variable.to_string(), |n| n.to_string()),
                year: r.year,
                month: r.month,
                value: r.value,
            })
            .collect();

        if records.is_empty() {
            return Err(LyraError::EmptyResult {
                filters: query.filters(),
            });
        }
        info!("Metrics query matched {} rows", records.len());

        match request.aggregation {
            Some(agg) => Ok(serde_json::to_vec(&aggregate(
                &records,
                agg,
                request.granularity,
            ))?),
            None => Ok(serde_json::to_vec(&records)?),
        }
    }
}
