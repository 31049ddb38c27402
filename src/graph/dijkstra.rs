//! Bidirectional Dijkstra over [`Graph`] views.
//!
//! Each direction runs its own indexed binary heap; per-node search
//! state lives in a flat arena addressed by node id, so decrease-key is
//! an O(log n) sift instead of a lazy reinsert. The searches alternate
//! one settle at a time and stop at the first node settled from both
//! sides.

use super::{Graph, NodeId, FIRST_NODE, NO_NODE};

const UNKNOWN: i32 = -1;
const SETTLED: i32 = -2;

/// Per-node search state. `index` is the node's current heap position,
/// or one of the [`UNKNOWN`]/[`SETTLED`] markers.
#[derive(Clone, Copy)]
struct Entry {
    index: i32,
    cost: f32,
    parent: NodeId,
}

struct SearchHeap {
    entries: Vec<Entry>,
    heap: Vec<NodeId>,
}

impl SearchHeap {
    fn new(count: usize) -> SearchHeap {
        SearchHeap {
            entries: vec![
                Entry {
                    index: UNKNOWN,
                    cost: 0.0,
                    parent: NO_NODE,
                };
                count + FIRST_NODE as usize
            ],
            heap: Vec::new(),
        }
    }

    fn settled(&self, id: NodeId) -> bool {
        self.entries[id as usize].index == SETTLED
    }

    fn cost(&self, id: NodeId) -> f32 {
        self.entries[id as usize].cost
    }

    fn parent(&self, id: NodeId) -> NodeId {
        self.entries[id as usize].parent
    }

    /// Offer `id` at `cost`. Inserts unknown nodes, decreases the key of
    /// queued ones, and leaves settled or already-cheaper entries alone.
    fn visit(&mut self, id: NodeId, cost: f32, parent: NodeId) {
        let e = self.entries[id as usize];
        match e.index {
            SETTLED => {}
            UNKNOWN => {
                let pos = self.heap.len();
                self.heap.push(id);
                self.entries[id as usize] = Entry {
                    index: pos as i32,
                    cost,
                    parent,
                };
                self.sift_up(pos);
            }
            _ if cost < e.cost => {
                self.entries[id as usize].cost = cost;
                self.entries[id as usize].parent = parent;
                self.sift_up(e.index as usize);
            }
            _ => {}
        }
    }

    /// Remove and settle the cheapest queued node.
    fn pop(&mut self) -> Option<NodeId> {
        if self.heap.is_empty() {
            return None;
        }
        let top = self.heap[0];
        let last = self.heap.pop().filter(|_| !self.heap.is_empty());
        if let Some(last) = last {
            self.heap[0] = last;
            self.entries[last as usize].index = 0;
            self.sift_down(0);
        }
        self.entries[top as usize].index = SETTLED;
        Some(top)
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let up = (pos - 1) / 2;
            if self.cost(self.heap[up]) <= self.cost(self.heap[pos]) {
                break;
            }
            self.swap(pos, up);
            pos = up;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        loop {
            let mut least = pos;
            for child in [2 * pos + 1, 2 * pos + 2] {
                if child < self.heap.len() && self.cost(self.heap[child]) < self.cost(self.heap[least])
                {
                    least = child;
                }
            }
            if least == pos {
                return;
            }
            self.swap(pos, least);
            pos = least;
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.entries[self.heap[a] as usize].index = a as i32;
        self.entries[self.heap[b] as usize].index = b as i32;
    }
}

/// Shortest path from `from` to `to`, endpoints included. An empty
/// vector means the nodes are not connected; it is not an error.
pub fn shortest_path<G: Graph>(graph: &G, from: NodeId, to: NodeId) -> Vec<NodeId> {
    if from == to {
        return vec![from];
    }
    let mut q = [SearchHeap::new(graph.count()), SearchHeap::new(graph.count())];
    q[0].visit(from, 0.0, NO_NODE);
    q[1].visit(to, 0.0, NO_NODE);

    let mut meeting = NO_NODE;
    let mut dir = 0;
    loop {
        let node = match q[dir].pop() {
            Some(node) => node,
            None => break,
        };
        if q[1 - dir].settled(node) {
            meeting = node;
            break;
        }
        let cost = q[dir].cost(node);
        for &neighbor in graph.neighbors(node) {
            q[dir].visit(neighbor, cost + graph.distance(node, neighbor), node);
        }
        dir = 1 - dir;
    }
    if meeting == NO_NODE {
        return Vec::new();
    }

    let mut path = Vec::new();
    let mut node = meeting;
    while node != NO_NODE {
        path.push(node);
        node = q[0].parent(node);
    }
    path.reverse();
    let mut node = q[1].parent(meeting);
    while node != NO_NODE {
        path.push(node);
        node = q[1].parent(node);
    }
    path
}

/// Total weight of a path produced by [`shortest_path`].
pub fn path_weight<G: Graph>(graph: &G, path: &[NodeId]) -> f64 {
    path.windows(2)
        .map(|pair| graph.distance(pair[0], pair[1]) as f64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AdjGraph;

    //       b --- c
    //      /       \
    //     a         e --- f
    //      \       /
    //       d ----
    // plus g isolated
    fn diamond() -> (AdjGraph, Vec<NodeId>) {
        let mut g = AdjGraph::new();
        let ids: Vec<NodeId> = (0..7).map(|_| g.add_node()).collect();
        let (a, b, c, d, e, f) = (ids[0], ids[1], ids[2], ids[3], ids[4], ids[5]);
        g.add_edge(a, b, 1.0);
        g.add_edge(b, c, 1.0);
        g.add_edge(c, e, 1.0);
        g.add_edge(a, d, 1.0);
        g.add_edge(d, e, 2.5);
        g.add_edge(e, f, 1.0);
        (g, ids)
    }

    #[test]
    fn picks_cheaper_of_two_routes() {
        let (g, ids) = diamond();
        let (a, b, c, e, f) = (ids[0], ids[1], ids[2], ids[4], ids[5]);
        assert_eq!(shortest_path(&g, a, f), vec![a, b, c, e, f]);
    }

    #[test]
    fn path_is_symmetric() {
        let (g, ids) = diamond();
        let (a, f) = (ids[0], ids[5]);
        let forward = shortest_path(&g, a, f);
        let mut backward = shortest_path(&g, f, a);
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn trivial_and_adjacent_paths() {
        let (g, ids) = diamond();
        let (a, b) = (ids[0], ids[1]);
        assert_eq!(shortest_path(&g, a, a), vec![a]);
        assert_eq!(shortest_path(&g, a, b), vec![a, b]);
    }

    #[test]
    fn disconnected_nodes_yield_empty_path() {
        let (g, ids) = diamond();
        assert!(shortest_path(&g, ids[0], ids[6]).is_empty());
        assert!(shortest_path(&g, ids[6], ids[0]).is_empty());
    }

    #[test]
    fn weight_of_found_path() {
        let (g, ids) = diamond();
        let path = shortest_path(&g, ids[0], ids[5]);
        let w = path_weight(&g, &path);
        assert!((w - 4.0).abs() < 1e-6, "weight {w}");
    }

    #[test]
    fn long_chain() {
        let mut g = AdjGraph::new();
        let ids: Vec<NodeId> = (0..1000).map(|_| g.add_node()).collect();
        for pair in ids.windows(2) {
            g.add_edge(pair[0], pair[1], 1.0);
        }
        let path = shortest_path(&g, ids[0], ids[999]);
        assert_eq!(path, ids);
    }

    fn pseudo_random(seed: &mut u64) -> u64 {
        *seed ^= *seed << 13;
        *seed ^= *seed >> 7;
        *seed ^= *seed << 17;
        *seed >> 16
    }

    /// Plain single-source Dijkstra with linear minimum selection.
    /// Integer-valued weights keep every sum exact in f32.
    fn reference_distances<G: Graph>(g: &G, src: NodeId) -> Vec<f32> {
        let n = g.count();
        let mut dist = vec![f32::INFINITY; n + 1];
        let mut done = vec![false; n + 1];
        dist[src as usize] = 0.0;
        loop {
            let mut best = NO_NODE;
            for id in FIRST_NODE..=n as NodeId {
                if !done[id as usize]
                    && dist[id as usize].is_finite()
                    && (best == NO_NODE || dist[id as usize] < dist[best as usize])
                {
                    best = id;
                }
            }
            if best == NO_NODE {
                return dist;
            }
            done[best as usize] = true;
            for &nb in g.neighbors(best) {
                let d = dist[best as usize] + g.distance(best, nb);
                if d < dist[nb as usize] {
                    dist[nb as usize] = d;
                }
            }
        }
    }

    fn assert_valid_path<G: Graph>(g: &G, path: &[NodeId], from: NodeId, to: NodeId) {
        assert_eq!(path.first(), Some(&from));
        assert_eq!(path.last(), Some(&to));
        for pair in path.windows(2) {
            assert!(
                g.neighbors(pair[0]).contains(&pair[1]),
                "no edge {} -> {}",
                pair[0],
                pair[1]
            );
        }
    }

    /// Exhaust one search heap over a whole component and compare every
    /// settled cost against the reference. This exercises the indexed
    /// heap and its decrease-key sifts far beyond the toy graphs.
    #[test]
    fn indexed_heap_matches_reference_on_random_graphs() {
        let mut seed = 0x9e3779b97f4a7c15;
        for _ in 0..4 {
            let n = 300;
            let mut g = AdjGraph::new();
            let ids: Vec<NodeId> = (0..n).map(|_| g.add_node()).collect();
            for _ in 0..2000 {
                let a = ids[(pseudo_random(&mut seed) % n as u64) as usize];
                let b = ids[(pseudo_random(&mut seed) % n as u64) as usize];
                if a == b {
                    continue;
                }
                let w = (1 + pseudo_random(&mut seed) % 16) as f32;
                g.add_edge(a, b, w);
            }
            let src = ids[(pseudo_random(&mut seed) % n as u64) as usize];
            let want = reference_distances(&g, src);

            let mut heap = SearchHeap::new(g.count());
            heap.visit(src, 0.0, NO_NODE);
            while let Some(node) = heap.pop() {
                let cost = heap.cost(node);
                for &nb in g.neighbors(node) {
                    heap.visit(nb, cost + g.distance(node, nb), node);
                }
            }
            for &id in &ids {
                if heap.settled(id) {
                    assert_eq!(heap.cost(id), want[id as usize], "node {id}");
                } else {
                    assert!(want[id as usize].is_infinite(), "node {id}");
                }
            }
        }
    }

    /// On trees the shortest path is the unique path, so the
    /// first-meeting termination is exact and the full bidirectional
    /// search can be pinned to the reference distance.
    #[test]
    fn matches_reference_dijkstra_on_random_trees() {
        let mut seed = 0x2545f4914f6cdd1d;
        let n = 1500;
        let mut g = AdjGraph::new();
        let ids: Vec<NodeId> = (0..n).map(|_| g.add_node()).collect();
        for i in 1..n {
            let parent = ids[(pseudo_random(&mut seed) % i as u64) as usize];
            let w = (1 + pseudo_random(&mut seed) % 16) as f32;
            g.add_edge(parent, ids[i], w);
        }
        for _ in 0..20 {
            let from = ids[(pseudo_random(&mut seed) % n as u64) as usize];
            let to = ids[(pseudo_random(&mut seed) % n as u64) as usize];
            let want = reference_distances(&g, from)[to as usize];
            let path = shortest_path(&g, from, to);
            assert_valid_path(&g, &path, from, to);
            let got = path_weight(&g, &path);
            assert!((got - want as f64).abs() < 1e-3, "{from}->{to}: {got} != {want}");
        }
    }

    #[test]
    fn decrease_key_reroutes_queued_node() {
        // The forward search discovers e through the direct expensive
        // edge first, then improves it through c before settling.
        let mut g = AdjGraph::new();
        let a = g.add_node();
        let b = g.add_node();
        let c = g.add_node();
        let e = g.add_node();
        let f = g.add_node();
        g.add_edge(a, e, 10.0);
        g.add_edge(a, b, 1.0);
        g.add_edge(b, c, 1.0);
        g.add_edge(c, e, 1.0);
        g.add_edge(e, f, 1.0);
        assert_eq!(shortest_path(&g, a, f), vec![a, b, c, e, f]);
    }
}
