//! Upstream and downstream closures over a catchment graph

use crate::rsb::graph::CatchmentGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;

/// Direction of a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Everything that drains into the start
    Upstream,
    /// Everything the start drains into
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream => write!(f, "upstream"),
            Self::Downstream => write!(f, "downstream"),
        }
    }
}

/// Ids reachable from `start` in `direction`, `start` included, ascending
///
/// Breadth-first over the adjacency lists, visiting each node and edge at
/// most once, so cycles terminate. An id not in the graph traces to itself.
pub fn trace(graph: &CatchmentGraph, start: i64, direction: Direction) -> Vec<i64> {
    let mut seen = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(id) = queue.pop_front() {
        let next: Vec<i64> = match direction {
            Direction::Upstream => graph.upstream_neighbors(id).collect(),
            Direction::Downstream => graph.downstream_neighbors(id).collect(),
        };
        for neighbor in next {
            if seen.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }

    seen.into_iter().collect()
}

/// Every catchment whose water eventually flows through `start`
pub fn trace_upstream(graph: &CatchmentGraph, start: i64) -> Vec<i64> {
    trace(graph, start, Direction::Upstream)
}

/// Every catchment `start`'s water eventually reaches
pub fn trace_downstream(graph: &CatchmentGraph, start: i64) -> Vec<i64> {
    trace(graph, start, Direction::Downstream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rsb::graph::{build_graph, TerminalNode};
    use crate::rsb::records::{CatchmentRecord, Row};

    fn graph(edges: &[(i64, i64)]) -> CatchmentGraph {
        let rows: Vec<Row> = edges
            .iter()
            .map(|(from, to)| CatchmentRecord::new(*from, *to, "Aliso").to_row("CatchIDN", "DwnCatchIDN"))
            .collect();
        build_graph(&rows, "CatchIDN", "DwnCatchIDN", Some(&TerminalNode::default())).unwrap()
    }

    /// Aliso Creek test topology
    fn aliso() -> CatchmentGraph {
        graph(&[
            (10, 24),
            (23, 10),
            (328, 10),
            (214, 328),
            (213, 214),
            (278, 23),
            (216, 23),
            (211, 216),
            (212, 216),
            (210, 216),
        ])
    }

    #[test]
    fn small_network_scenario() {
        let g = graph(&[(10, 24), (23, 10), (16, 23), (216, 23)]);
        assert_eq!(trace_upstream(&g, 10), vec![10, 16, 23, 216]);
        assert_eq!(trace_downstream(&g, 16), vec![10, 16, 23, 24]);
    }

    #[test]
    fn upstream_of_outlet_catchment() {
        let g = aliso();
        assert_eq!(
            trace_upstream(&g, 10),
            vec![10, 23, 210, 211, 212, 213, 214, 216, 278, 328]
        );
        assert_eq!(trace_upstream(&g, 328), vec![213, 214, 328]);
    }

    #[test]
    fn downstream_paths() {
        let g = aliso();
        assert_eq!(trace_downstream(&g, 10), vec![10, 24]);
        assert_eq!(trace_downstream(&g, 216), vec![10, 23, 24, 216]);
        assert_eq!(trace_downstream(&g, 210), vec![10, 23, 24, 210, 216]);
    }

    #[test]
    fn off_graph_id_traces_to_itself() {
        let g = aliso();
        assert_eq!(trace_upstream(&g, 9999), vec![9999]);
        assert_eq!(trace_downstream(&g, 9999), vec![9999]);
    }

    #[test]
    fn every_node_includes_itself() {
        let g = aliso();
        for id in g.node_ids() {
            assert!(trace_upstream(&g, id).contains(&id));
            assert!(trace_downstream(&g, id).contains(&id));
        }
    }

    #[test]
    fn edges_are_mutually_reachable_in_opposite_directions() {
        let g = aliso();
        for (a, b) in g.edges() {
            assert!(trace_downstream(&g, a).contains(&b));
            assert!(trace_upstream(&g, b).contains(&a));
        }
    }

    #[test]
    fn repeated_traces_are_identical() {
        let g = aliso();
        assert_eq!(trace_upstream(&g, 23), trace_upstream(&g, 23));
        let result = trace_downstream(&g, 211);
        let mut sorted = result.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(result, sorted);
    }

    #[test]
    fn cycles_terminate() {
        let g = graph(&[(1, 2), (2, 3), (3, 1), (4, 1)]);
        assert_eq!(trace_downstream(&g, 4), vec![1, 2, 3, 4]);
        assert_eq!(trace_upstream(&g, 2), vec![1, 2, 3, 4]);
    }

    #[test]
    fn traces_reach_terminal_node() {
        let g = graph(&[(10, 24), (24, 0)]);
        assert_eq!(trace_downstream(&g, 10), vec![0, 10, 24]);
        assert_eq!(trace_upstream(&g, 0), vec![0, 10, 24]);
    }
}
