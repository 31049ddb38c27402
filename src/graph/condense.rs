//! Chain condensation: collapse runs of pass-through nodes into single
//! weighted edges between the nodes a caller-supplied predicate keeps.

use rustc_hash::{FxHashMap, FxHashSet};

use super::{AdjGraph, Graph, NodeId, FIRST_NODE};

/// One condensed edge; `weight` is the summed length of the collapsed
/// chain in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f32,
}

pub type Edgelist = Vec<Edge>;

/// Collapse the graph onto the nodes `keep` accepts. Every maximal chain
/// of rejected nodes between two kept nodes becomes one edge carrying
/// the chain's total weight; chains that dead-end or loop back without
/// reaching a second kept node are dropped. Each surviving edge is
/// emitted once, oriented from the smaller id.
pub fn condense<G, F>(graph: &G, keep: F) -> Edgelist
where
    G: Graph,
    F: Fn(NodeId) -> bool,
{
    let mut edges = Edgelist::new();
    for i in 0..graph.count() {
        let from = FIRST_NODE + i as NodeId;
        if !keep(from) {
            continue;
        }
        for &next in graph.neighbors(from) {
            let mut busy = FxHashSet::default();
            busy.insert(from);
            follow_chain(
                graph,
                &keep,
                from,
                next,
                graph.distance(from, next),
                &mut busy,
                &mut edges,
            );
        }
    }
    edges
}

fn follow_chain<G, F>(
    graph: &G,
    keep: &F,
    start: NodeId,
    node: NodeId,
    weight: f32,
    busy: &mut FxHashSet<NodeId>,
    edges: &mut Edgelist,
) where
    G: Graph,
    F: Fn(NodeId) -> bool,
{
    if keep(node) {
        // The chain is also walked from the other endpoint; emit it from
        // the smaller id only.
        if start < node {
            edges.push(Edge {
                from: start,
                to: node,
                weight,
            });
        }
        return;
    }
    if !busy.insert(node) {
        return;
    }
    for &next in graph.neighbors(node) {
        if busy.contains(&next) {
            continue;
        }
        follow_chain(
            graph,
            keep,
            start,
            next,
            weight + graph.distance(node, next),
            busy,
            edges,
        );
    }
}

/// Flatten a graph into its undirected edges, oriented from the smaller
/// id. Weights are read positionally, so two parallel condensed edges
/// between the same pair of nodes keep their own weights.
pub fn graph_to_edgelist(graph: &AdjGraph) -> Edgelist {
    let mut edges = Edgelist::new();
    for i in 0..graph.count() {
        let from = FIRST_NODE + i as NodeId;
        for (to, weight) in graph.edges_from(from) {
            if from < to {
                edges.push(Edge { from, to, weight });
            }
        }
    }
    edges
}

/// Rebuild a graph from an edge list, renumbering the endpoint ids onto
/// a gap-free range in ascending order of the old ids.
pub fn edgelist_to_graph(edges: &Edgelist) -> AdjGraph {
    let mut old_ids: Vec<NodeId> = edges
        .iter()
        .flat_map(|e| [e.from, e.to])
        .collect();
    old_ids.sort_unstable();
    old_ids.dedup();

    let mut graph = AdjGraph::new();
    let mut renumber = FxHashMap::default();
    for old in old_ids {
        renumber.insert(old, graph.add_node());
    }
    for e in edges {
        graph.add_edge(renumber[&e.from], renumber[&e.to], e.weight);
    }
    graph
}
