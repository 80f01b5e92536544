//! Cached regional subbasin graph and traces

use crate::cache::{CacheClient, CacheKey};
use crate::config::RsbConfig;
use crate::error::LyraResult;
use crate::rsb::graph::{build_graph, CatchmentGraph, TerminalNode};
use crate::rsb::records::parse_rows;
use crate::rsb::trace::{trace, Direction};
use crate::source::ByteSource;
use std::sync::Arc;
use tracing::info;

/// Graph construction and tracing over one topology source
#[derive(Clone)]
pub struct RsbService {
    cache: CacheClient,
    source: Arc<dyn ByteSource>,
    config: RsbConfig,
}

impl RsbService {
    pub fn new(cache: CacheClient, source: Arc<dyn ByteSource>, config: RsbConfig) -> Self {
        Self {
            cache,
            source,
            config,
        }
    }

    fn terminal(&self) -> Option<TerminalNode> {
        self.config.terminal_id.map(|id| TerminalNode {
            id,
            label: self.config.terminal_label.clone(),
        })
    }

    /// Key parameters shared by the graph and every trace over it
    fn keyed(&self, key: CacheKey) -> LyraResult<CacheKey> {
        key.kwarg("source", &self.source.identity())?
            .kwarg("source_column", &self.config.source_column)?
            .kwarg("target_column", &self.config.target_column)?
            .kwarg("terminal", &self.terminal())
    }

    /// Build the graph straight from the source, bypassing the cache
    pub async fn build(&self) -> LyraResult<CatchmentGraph> {
        let bytes = self.source.read().await?;
        let rows = parse_rows(&bytes)?;
        let graph = build_graph(
            &rows,
            &self.config.source_column,
            &self.config.target_column,
            self.terminal().as_ref(),
        )?;
        info!(
            "Constructed catchment graph from {} ({} nodes)",
            self.source.identity(),
            graph.node_count()
        );
        Ok(graph)
    }

    /// Node-link JSON of the graph, cached until flushed by default
    pub async fn graph_bytes(&self) -> LyraResult<Vec<u8>> {
        let key = self.keyed(CacheKey::new("construct_rsb_graph"))?;
        self.cache
            .get_or_compute(&key, self.config.graph_ttl(), || self.compute_graph_bytes())
            .await
    }

    async fn compute_graph_bytes(&self) -> LyraResult<Vec<u8>> {
        let graph = self.build().await?;
        Ok(serde_json::to_vec(&graph.to_node_link())?)
    }

    /// The current graph snapshot
    pub async fn graph(&self) -> LyraResult<CatchmentGraph> {
        let bytes = self.graph_bytes().await?;
        CatchmentGraph::from_node_link(&serde_json::from_slice(&bytes)?)
    }

    async fn trace_bytes(&self, catchidn: i64, direction: Direction) -> LyraResult<Vec<u8>> {
        let key = self.keyed(CacheKey::new(format!("rsb_{}_trace", direction)).arg(&catchidn)?)?;
        self.cache
            .get_or_compute(&key, self.config.trace_ttl(), || {
                self.compute_trace(catchidn, direction)
            })
            .await
    }

    async fn compute_trace(&self, catchidn: i64, direction: Direction) -> LyraResult<Vec<u8>> {
        let graph = self.graph().await?;
        Ok(serde_json::to_vec(&trace(&graph, catchidn, direction))?)
    }

    /// Sorted JSON list of catchments upstream of `catchidn`, inclusive
    pub async fn upstream_trace(&self, catchidn: i64) -> LyraResult<Vec<u8>> {
        self.trace_bytes(catchidn, Direction::Upstream).await
    }

    /// Sorted JSON list of catchments downstream of `catchidn`, inclusive
    pub async fn downstream_trace(&self, catchidn: i64) -> LyraResult<Vec<u8>> {
        self.trace_bytes(catchidn, Direction::Downstream).await
    }

    /// Decoded trace ids
    pub async fn trace_ids(&self, catchidn: i64, direction: Direction) -> LyraResult<Vec<i64>> {
        Ok(serde_json::from_slice(&self.trace_bytes(catchidn, direction).await?)?)
    }

    /// Trace wrapped in a response envelope; failures become `FAILURE` envelopes
    pub async fn trace_response(&self, catchidn: i64, direction: Direction) -> LyraResult<Vec<u8>> {
        let key = self.keyed(
            CacheKey::new(format!("rsb_{}_trace_response", direction)).arg(&catchidn)?,
        )?;
        self.cache
            .get_or_compute_response(&key, self.config.response_ttl(), || {
                self.trace_bytes(catchidn, direction)
            })
            .await
    }

    pub async fn upstream_trace_response(&self, catchidn: i64) -> LyraResult<Vec<u8>> {
        self.trace_response(catchidn, Direction::Upstream).await
    }

    pub async fn downstream_trace_response(&self, catchidn: i64) -> LyraResult<Vec<u8>> {
        self.trace_response(catchidn, Direction::Downstream).await
    }
}
