//! Topology graph derivation and layered layout.
//!
//! Turns the backend's flat node map into the coordinator → edges → clients
//! DAG and places it top-to-bottom for rendering.

pub mod graph;
pub mod layout;

pub use graph::{derive_graph, EdgeStyle, GraphEdge, GraphNode, TopologyGraph};
pub use layout::{layout, AnchorSide, LayoutConfig, LayoutedGraph, PositionedNode};
