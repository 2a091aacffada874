//! Layered top-to-bottom placement for derived graphs.
//!
//! Narrow interface: [`layout`] takes a graph and a [`LayoutConfig`] and
//! assigns every node a top-left position plus anchor sides. Nodes are
//! ranked by longest path from the roots and each rank is centered
//! horizontally; any rank-based DAG layout could be swapped in behind the
//! same signature.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::graph::{GraphEdge, TopologyGraph};
use crate::GraphNode;

/// Box geometry and spacing for the layered layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Uniform node box width.
    pub node_width: f64,
    /// Uniform node box height.
    pub node_height: f64,
    /// Horizontal gap between rank neighbors.
    pub node_sep: f64,
    /// Vertical gap between ranks.
    pub rank_sep: f64,
    /// Outer margin on the x axis.
    pub margin_x: f64,
    /// Outer margin on the y axis.
    pub margin_y: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: 172.0,
            node_height: 36.0,
            node_sep: 50.0,
            rank_sep: 50.0,
            margin_x: 50.0,
            margin_y: 50.0,
        }
    }
}

/// Side of the node box an edge attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnchorSide {
    Top,
    Bottom,
}

/// A graph node with its assigned position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedNode {
    pub node: GraphNode,
    /// Top-left corner.
    pub x: f64,
    pub y: f64,
    /// Rank index, 0 at the top.
    pub rank: usize,
    /// Side outgoing edges leave from.
    pub source_anchor: AnchorSide,
    /// Side incoming edges arrive at.
    pub target_anchor: AnchorSide,
}

impl PositionedNode {
    /// Attachment point on the given side (horizontal center of the box).
    pub fn anchor_point(&self, side: AnchorSide, config: &LayoutConfig) -> (f64, f64) {
        let cx = self.x + config.node_width / 2.0;
        match side {
            AnchorSide::Top => (cx, self.y),
            AnchorSide::Bottom => (cx, self.y + config.node_height),
        }
    }

    /// Point outgoing edges leave from.
    pub fn source_point(&self, config: &LayoutConfig) -> (f64, f64) {
        self.anchor_point(self.source_anchor, config)
    }

    /// Point incoming edges arrive at.
    pub fn target_point(&self, config: &LayoutConfig) -> (f64, f64) {
        self.anchor_point(self.target_anchor, config)
    }
}

/// A graph with positions assigned: nodes placed, edges carried through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutedGraph {
    pub nodes: Vec<PositionedNode>,
    pub edges: Vec<GraphEdge>,
    /// Canvas width including margins.
    pub width: f64,
    /// Canvas height including margins.
    pub height: f64,
}

impl LayoutedGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&PositionedNode> {
        self.nodes.iter().find(|positioned| positioned.node.id == id)
    }
}

/// Place a derived graph top-to-bottom.
///
/// Rank 0 holds the roots (nodes with no incoming edge); every edge pushes
/// its target at least one rank below its source. Within a rank, nodes keep
/// their emission order and the rank is centered against the widest one.
pub fn layout(graph: &TopologyGraph, config: &LayoutConfig) -> LayoutedGraph {
    if graph.nodes.is_empty() {
        return LayoutedGraph::default();
    }

    let index: HashMap<&str, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id.as_str(), i))
        .collect();

    // Longest-path ranking by edge relaxation. The pass count is capped at
    // the node count, so a cyclic input still terminates.
    let mut ranks = vec![0usize; graph.nodes.len()];
    for _ in 0..graph.nodes.len() {
        let mut changed = false;
        for edge in &graph.edges {
            let (Some(&source), Some(&target)) = (
                index.get(edge.source.as_str()),
                index.get(edge.target.as_str()),
            ) else {
                continue;
            };
            if ranks[target] < ranks[source] + 1 {
                ranks[target] = ranks[source] + 1;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let rank_count = ranks.iter().max().copied().unwrap_or(0) + 1;
    let mut rows: Vec<Vec<usize>> = vec![Vec::new(); rank_count];
    for (i, &rank) in ranks.iter().enumerate() {
        rows[rank].push(i);
    }

    let row_width = |count: usize| {
        count as f64 * config.node_width + count.saturating_sub(1) as f64 * config.node_sep
    };
    let widest = rows
        .iter()
        .map(|row| row_width(row.len()))
        .fold(0.0, f64::max);

    let mut nodes = vec![None; graph.nodes.len()];
    for (rank, row) in rows.iter().enumerate() {
        let x_offset = config.margin_x + (widest - row_width(row.len())) / 2.0;
        let y = config.margin_y + rank as f64 * (config.node_height + config.rank_sep);
        for (slot, &i) in row.iter().enumerate() {
            nodes[i] = Some(PositionedNode {
                node: graph.nodes[i].clone(),
                x: x_offset + slot as f64 * (config.node_width + config.node_sep),
                y,
                rank,
                source_anchor: AnchorSide::Bottom,
                target_anchor: AnchorSide::Top,
            });
        }
    }

    LayoutedGraph {
        nodes: nodes.into_iter().flatten().collect(),
        edges: graph.edges.clone(),
        width: widest + 2.0 * config.margin_x,
        height: rank_count as f64 * config.node_height
            + rank_count.saturating_sub(1) as f64 * config.rank_sep
            + 2.0 * config.margin_y,
    }
}
