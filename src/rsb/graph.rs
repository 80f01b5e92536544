//! Directed catchment graph
//!
//! Each catchment points at the catchment it drains into. The graph keeps
//! both directions of every edge so that ancestor and descendant closures
//! are plain adjacency walks.

use crate::error::{LyraError, LyraResult};
use crate::rsb::records::{id_field, Row, REP_X, REP_Y, WATERSHED};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Synthetic outlet node added when some catchment drains to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalNode {
    pub id: i64,
    pub label: String,
}

impl Default for TerminalNode {
    fn default() -> Self {
        Self {
            id: 0,
            label: "Ocean".to_string(),
        }
    }
}

impl TerminalNode {
    fn attributes(&self) -> Row {
        let mut attrs = Row::new();
        attrs.insert(REP_X.to_string(), 0.into());
        attrs.insert(REP_Y.to_string(), 0.into());
        attrs.insert(WATERSHED.to_string(), self.label.clone().into());
        attrs
    }
}

/// Immutable drainage graph keyed by catchment id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatchmentGraph {
    nodes: BTreeMap<i64, Row>,
    downstream: BTreeMap<i64, BTreeSet<i64>>,
    upstream: BTreeMap<i64, BTreeSet<i64>>,
}

impl CatchmentGraph {
    fn add_node(&mut self, id: i64) {
        self.nodes.entry(id).or_default();
    }

    fn add_edge(&mut self, from: i64, to: i64) {
        self.add_node(from);
        self.add_node(to);
        self.downstream.entry(from).or_default().insert(to);
        self.upstream.entry(to).or_default().insert(from);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.downstream.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Node ids in ascending order
    pub fn node_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.nodes.keys().copied()
    }

    /// Attributes attached to a node
    pub fn attributes(&self, id: i64) -> Option<&Row> {
        self.nodes.get(&id)
    }

    /// Every `(from, to)` edge, ordered by `from` then `to`
    pub fn edges(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.downstream
            .iter()
            .flat_map(|(from, tos)| tos.iter().map(move |to| (*from, *to)))
    }

    /// Catchments draining directly into `id`
    pub fn upstream_neighbors(&self, id: i64) -> impl Iterator<Item = i64> + '_ {
        self.upstream.get(&id).into_iter().flatten().copied()
    }

    /// Catchments `id` drains directly into
    pub fn downstream_neighbors(&self, id: i64) -> impl Iterator<Item = i64> + '_ {
        self.downstream.get(&id).into_iter().flatten().copied()
    }

    /// Serialize as node-link JSON
    pub fn to_node_link(&self) -> Value {
        let nodes: Vec<Value> = self
            .nodes
            .iter()
            .map(|(id, attrs)| {
                let mut node = attrs.clone();
                node.insert("id".to_string(), (*id).into());
                Value::Object(node)
            })
            .collect();
        let links: Vec<Value> = self
            .edges()
            .map(|(source, target)| serde_json::json!({ "source": source, "target": target }))
            .collect();

        serde_json::json!({
            "directed": true,
            "multigraph": false,
            "graph": {},
            "nodes": nodes,
            "links": links,
        })
    }

    /// Rebuild a graph from node-link JSON
    pub fn from_node_link(value: &Value) -> LyraResult<Self> {
        let mut graph = Self::default();

        for (index, node) in value["nodes"].as_array().into_iter().flatten().enumerate() {
            let mut attrs = node
                .as_object()
                .cloned()
                .ok_or_else(|| LyraError::malformed("id", index))?;
            let id = id_field(&attrs, "id", index)?;
            attrs.remove("id");
            graph.nodes.insert(id, attrs);
        }

        for (index, link) in value["links"].as_array().into_iter().flatten().enumerate() {
            let link = link
                .as_object()
                .ok_or_else(|| LyraError::malformed("source", index))?;
            let source = id_field(link, "source", index)?;
            let target = id_field(link, "target", index)?;
            graph.add_edge(source, target);
        }

        Ok(graph)
    }
}

/// Build a drainage graph from rows
///
/// One edge per row from `source_column` to `target_column`. All other
/// columns become attributes of the source node; a repeated id keeps the
/// last row's attributes. When `terminal` is given and some row drains to
/// its id, the terminal node exists with fallback attributes unless a row
/// defines it.
pub fn build_graph(
    records: &[Row],
    source_column: &str,
    target_column: &str,
    terminal: Option<&TerminalNode>,
) -> LyraResult<CatchmentGraph> {
    let mut graph = CatchmentGraph::default();
    let mut defined = BTreeSet::new();
    let mut reaches_terminal = false;

    for (index, row) in records.iter().enumerate() {
        let source = id_field(row, source_column, index)?;
        let target = id_field(row, target_column, index)?;

        graph.add_edge(source, target);

        let attrs: Row = row
            .iter()
            .filter(|(k, _)| k.as_str() != source_column && k.as_str() != target_column)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        graph.nodes.insert(source, attrs);
        defined.insert(source);

        if terminal.is_some_and(|t| t.id == target) {
            reaches_terminal = true;
        }
    }

    if let Some(terminal) = terminal {
        if reaches_terminal && !defined.contains(&terminal.id) {
            graph.nodes.insert(terminal.id, terminal.attributes());
        }
    }

    debug!(
        "Built catchment graph with {} nodes and {} edges",
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}
