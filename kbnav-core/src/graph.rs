// Reference graph model: files, directories and the links between them

use kbnav_client::{GraphEdge, GraphNode, GraphPayload, NodeKind};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeShape {
    Square,
    Circle,
}

/// Visual identity of a node. Depends on nothing but the node kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeStyle {
    pub shape: NodeShape,
    pub size: f32,
    pub color: &'static str,
}

impl NodeStyle {
    pub const fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Directory => NodeStyle {
                shape: NodeShape::Square,
                size: 10.0,
                color: "#284CAC",
            },
            NodeKind::File => NodeStyle {
                shape: NodeShape::Circle,
                size: 8.0,
                color: "#71717a",
            },
        }
    }
}

/// What a click on a graph node should do.
///
/// Selection always happens; navigation only for file nodes. The two are
/// independent, so a failed navigation never undoes the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickAction {
    pub select: GraphNode,
    pub navigate: Option<String>,
}

/// Directed multigraph of nodes keyed by id. Cycles are allowed.
///
/// Edges whose endpoints are not both present are kept aside as dangling and
/// never take part in traversal.
#[derive(Debug, Clone, Default)]
pub struct GraphModel {
    graph: DiGraph<GraphNode, ()>,
    index: HashMap<String, NodeIndex>,
    dangling: Vec<GraphEdge>,
}

impl GraphModel {
    pub fn from_payload(payload: GraphPayload) -> Self {
        let mut graph = DiGraph::with_capacity(payload.nodes.len(), payload.edges.len());
        let mut index: HashMap<String, NodeIndex> = HashMap::new();

        for node in payload.nodes {
            match index.get(&node.id) {
                Some(&existing) => graph[existing] = node,
                None => {
                    let id = node.id.clone();
                    let idx = graph.add_node(node);
                    index.insert(id, idx);
                }
            }
        }

        let mut dangling = Vec::new();
        for edge in payload.edges {
            match (index.get(&edge.source), index.get(&edge.target)) {
                (Some(&s), Some(&t)) => {
                    graph.add_edge(s, t, ());
                }
                _ => {
                    debug!("Dropping dangling edge {} -> {}", edge.source, edge.target);
                    dangling.push(edge);
                }
            }
        }

        Self {
            graph,
            index,
            dangling,
        }
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.index.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_weights()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Edges with both endpoints present, as (source, target) nodes.
    pub fn edges(&self) -> impl Iterator<Item = (&GraphNode, &GraphNode)> {
        self.graph
            .edge_references()
            .map(|e| (&self.graph[e.source()], &self.graph[e.target()]))
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn dangling_edges(&self) -> &[GraphEdge] {
        &self.dangling
    }

    /// Nodes this node links to.
    pub fn outgoing(&self, id: &str) -> Vec<&GraphNode> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Nodes linking to this node.
    pub fn incoming(&self, id: &str) -> Vec<&GraphNode> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<&GraphNode> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut found: Vec<&GraphNode> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| match direction {
                Direction::Outgoing => &self.graph[e.target()],
                Direction::Incoming => &self.graph[e.source()],
            })
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found.dedup_by(|a, b| a.id == b.id);
        found
    }

    /// Route a click on `id`. Unknown ids yield `None`.
    pub fn resolve_click(&self, id: &str) -> Option<ClickAction> {
        let node = self.node(id)?;
        let navigate = match node.kind {
            NodeKind::File => Some(node.path.clone()),
            NodeKind::Directory => None,
        };
        Some(ClickAction {
            select: node.clone(),
            navigate,
        })
    }
}
