//! Regional subbasin (RSB) catchment topology
//!
//! Rows of catchment topology become a [`CatchmentGraph`] whose edges point
//! downstream; [`trace_upstream`] and [`trace_downstream`] compute the
//! inclusive reachability closure from one catchment. [`RsbService`] wires
//! both to the function cache.

pub mod graph;
pub mod records;
pub mod service;
pub mod trace;

pub use graph::{build_graph, CatchmentGraph, TerminalNode};
pub use records::{parse_rows, CatchmentRecord, Row};
pub use service::RsbService;
pub use trace::{trace, trace_downstream, trace_upstream, Direction};
