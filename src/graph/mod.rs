//! Road graphs: a dense, contiguous adjacency representation built from
//! filtered way geometries, plus a growable form used for condensed
//! output and tests.

pub mod builder;
pub mod condense;
pub mod ddsg;
pub mod dijkstra;

pub use builder::{build_from_pbf, build_from_pbf_observed, GraphBuilder, WayFilter};
pub use condense::{condense, edgelist_to_graph, graph_to_edgelist, Edge, Edgelist};
pub use ddsg::write_ddsg;
pub use dijkstra::shortest_path;

use crate::geo::{great_circle_distance, Coords};
use crate::kdtree::PointSet;

/// Dense node identifier. Ids are gap-free and start at
/// [`FIRST_NODE`]; [`NO_NODE`] marks an absent node (empty adjacency
/// slot, missing tree child, path root).
pub type NodeId = u32;

pub const NO_NODE: NodeId = 0;
pub const FIRST_NODE: NodeId = 1;

/// Read-only view of a built graph. Edges are undirected and recorded
/// symmetrically at both endpoints; weights are in meters.
pub trait Graph {
    fn count(&self) -> usize;
    fn neighbors(&self, id: NodeId) -> &[NodeId];
    fn distance(&self, from: NodeId, to: NodeId) -> f32;
}

/// One node of the dense graph. The adjacency list is a sub-range of the
/// graph's flat edge buffer, sized exactly in the first pass.
#[derive(Clone, Copy, Default)]
pub(crate) struct RoadNode {
    pub(crate) position: Coords,
    pub(crate) edge_start: u32,
    pub(crate) edge_len: u32,
}

/// Dense road graph: a node arena addressed by id (slot 0 unused) over
/// one flat edge-id buffer. Write-once; queries need no synchronization.
pub struct RoadGraph {
    pub(crate) nodes: Vec<RoadNode>,
    pub(crate) edges: Vec<NodeId>,
}

impl RoadGraph {
    pub fn position(&self, id: NodeId) -> Coords {
        self.nodes[id as usize].position
    }
}

impl Graph for RoadGraph {
    fn count(&self) -> usize {
        self.nodes.len() - 1
    }

    fn neighbors(&self, id: NodeId) -> &[NodeId] {
        let n = &self.nodes[id as usize];
        &self.edges[n.edge_start as usize..(n.edge_start + n.edge_len) as usize]
    }

    fn distance(&self, from: NodeId, to: NodeId) -> f32 {
        great_circle_distance(self.position(from), self.position(to)) as f32
    }
}

impl PointSet for RoadGraph {
    fn len(&self) -> usize {
        self.count()
    }

    fn node(&self, i: usize) -> NodeId {
        i as NodeId + FIRST_NODE
    }

    fn point(&self, id: NodeId) -> Coords {
        self.position(id)
    }
}

/// Growable adjacency-list graph with stored weights. Used for the
/// renumbered form of a condensed edge list and for algorithm tests;
/// the main pipeline uses [`RoadGraph`].
#[derive(Default)]
pub struct AdjGraph {
    nodes: Vec<AdjNode>,
}

#[derive(Default)]
struct AdjNode {
    neighbors: Vec<NodeId>,
    weights: Vec<f32>,
}

impl AdjGraph {
    pub fn new() -> AdjGraph {
        AdjGraph::default()
    }

    pub fn add_node(&mut self) -> NodeId {
        self.nodes.push(AdjNode::default());
        FIRST_NODE + (self.nodes.len() - 1) as NodeId
    }

    /// Add an undirected edge, recorded at both endpoints.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, weight: f32) {
        self.half_edge(from, to, weight);
        self.half_edge(to, from, weight);
    }

    fn half_edge(&mut self, from: NodeId, to: NodeId, weight: f32) {
        let n = &mut self.nodes[(from - 1) as usize];
        n.neighbors.push(to);
        n.weights.push(weight);
    }

    /// Positional `(neighbor, weight)` pairs. Unlike [`Graph::distance`],
    /// this keeps parallel edges to the same neighbor distinct.
    pub fn edges_from(&self, from: NodeId) -> impl Iterator<Item = (NodeId, f32)> + '_ {
        let n = &self.nodes[(from - 1) as usize];
        n.neighbors.iter().copied().zip(n.weights.iter().copied())
    }
}

impl Graph for AdjGraph {
    fn count(&self) -> usize {
        self.nodes.len()
    }

    fn neighbors(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[(id - 1) as usize].neighbors
    }

    fn distance(&self, from: NodeId, to: NodeId) -> f32 {
        let n = &self.nodes[(from - 1) as usize];
        for (i, &neighbor) in n.neighbors.iter().enumerate() {
            if neighbor == to {
                return n.weights[i];
            }
        }
        // Callers only ask for adjacent pairs; anything else is a bug.
        panic!("no edge {from} -> {to}");
    }
}
