//! Derives the coordinator → edges → clients graph from a flat node map.

use serde::{Deserialize, Serialize};
use tracing::debug;

use fedscope_protocol::{NodeDescription, NodeKind, NodeMap};

/// Visual style of a derived edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeStyle {
    /// Coordinator → edge links.
    Solid,
    /// Edge → client links.
    Dashed,
}

/// One node of the derived graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Node id from the topology map.
    pub id: String,
    /// Display label; clients carry their partition id.
    pub label: String,
    pub kind: NodeKind,
}

/// One directed link of the derived graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// `source->target`.
    pub id: String,
    pub source: String,
    pub target: String,
    pub style: EdgeStyle,
}

/// The derived DAG, nodes and edges in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl TopologyGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

/// Derive the tiered graph from a flat topology map.
///
/// The coordinator is the first `server`-kind entry in map order; without
/// one the graph is empty, never partial. Every edge-kind entry hangs off
/// the coordinator. Client-kind entries hang off each edge whose
/// `client.port` equals their own `port`; a client no edge references is
/// left out, and an edge with no matching clients still appears.
pub fn derive_graph(topology: &NodeMap) -> TopologyGraph {
    let Some((coord_id, _)) = topology
        .iter()
        .find(|(_, node)| node.kind == NodeKind::Server)
    else {
        debug!("topology has no coordinator node, deriving empty graph");
        return TopologyGraph::default();
    };

    let mut graph = TopologyGraph::default();
    graph.nodes.push(GraphNode {
        id: coord_id.clone(),
        label: coord_id.clone(),
        kind: NodeKind::Server,
    });

    let clients: Vec<(&String, &NodeDescription)> = topology
        .iter()
        .filter(|(_, node)| node.kind == NodeKind::Client)
        .collect();

    for (edge_id, edge_node) in topology.iter().filter(|(_, n)| n.kind == NodeKind::Edge) {
        graph.nodes.push(GraphNode {
            id: edge_id.clone(),
            label: edge_id.clone(),
            kind: NodeKind::Edge,
        });
        graph.edges.push(GraphEdge {
            id: format!("{coord_id}->{edge_id}"),
            source: coord_id.clone(),
            target: edge_id.clone(),
            style: EdgeStyle::Solid,
        });

        // An edge with no client listener matches no clients.
        let Some(listen_port) = edge_node.client.as_ref().map(|ep| ep.port) else {
            continue;
        };
        for (client_id, client_node) in &clients {
            if client_node.port != Some(listen_port) {
                continue;
            }
            if graph.node(client_id).is_none() {
                graph.nodes.push(GraphNode {
                    id: (*client_id).clone(),
                    label: client_label(client_id, client_node),
                    kind: NodeKind::Client,
                });
            }
            graph.edges.push(GraphEdge {
                id: format!("{edge_id}->{client_id}"),
                source: edge_id.clone(),
                target: (*client_id).clone(),
                style: EdgeStyle::Dashed,
            });
        }
    }

    graph
}

/// Client display label, carrying the partition id when known.
fn client_label(id: &str, node: &NodeDescription) -> String {
    match node.partition_id {
        Some(partition) => format!("{id} (P{partition})"),
        None => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_label_with_and_without_partition() {
        let mut node = NodeDescription {
            kind: NodeKind::Client,
            host: "10.0.0.3".to_string(),
            port: Some(9000),
            partition_id: Some(2),
            server: None,
            client: None,
        };
        assert_eq!(client_label("c1", &node), "c1 (P2)");
        node.partition_id = None;
        assert_eq!(client_label("c1", &node), "c1");
    }
}
