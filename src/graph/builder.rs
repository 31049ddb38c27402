//! Two-pass dense graph construction from a PBF stream.
//!
//! Pass one scans only ways: it interns every node id referenced by a
//! kept way into a dense id and counts edge incidences, which fixes the
//! exact size of every adjacency sub-range. Pass two re-reads the
//! stream, copies node positions into the arena, and drops each
//! neighbor into the first empty slot of its node's range. Any slot
//! still empty afterwards means the two passes disagreed, which is
//! fatal.

use anyhow::{bail, Context, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::io::Read;

use super::{NodeId, RoadGraph, RoadNode, FIRST_NODE, NO_NODE};
use crate::pbf::{BlockData, Decoder, MapWay};

/// Selects the ways that become graph edges by their `highway` tag.
pub struct WayFilter {
    allowed: FxHashSet<String>,
}

impl WayFilter {
    pub fn new<I, S>(values: I) -> WayFilter
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WayFilter {
            allowed: values.into_iter().map(Into::into).collect(),
        }
    }

    /// The road classes that carry through traffic: motorway through
    /// tertiary, link ramps included. Service roads, footways, and
    /// residential streets are left out.
    pub fn default_roads() -> WayFilter {
        WayFilter::new([
            "motorway",
            "motorway_link",
            "trunk",
            "trunk_link",
            "primary",
            "primary_link",
            "secondary",
            "secondary_link",
            "tertiary",
            "tertiary_link",
        ])
    }

    pub fn keep(&self, way: &MapWay) -> bool {
        way.attrs
            .iter()
            .any(|a| a.key == "highway" && self.allowed.contains(&a.value))
    }
}

/// Pass-one state: id interning and incidence counts.
pub struct GraphBuilder {
    filter: WayFilter,
    ids: FxHashMap<i64, NodeId>,
    degrees: Vec<u32>,
    ways_kept: u64,
    ways_seen: u64,
}

impl GraphBuilder {
    pub fn new(filter: WayFilter) -> GraphBuilder {
        GraphBuilder {
            filter,
            ids: FxHashMap::default(),
            degrees: vec![0],
            ways_kept: 0,
            ways_seen: 0,
        }
    }

    pub fn scan_block(&mut self, block: &BlockData) {
        for way in &block.ways {
            self.ways_seen += 1;
            if !self.filter.keep(way) {
                continue;
            }
            self.ways_kept += 1;
            for pair in way.refs.windows(2) {
                if pair[0] == pair[1] {
                    continue;
                }
                let a = self.intern(pair[0]);
                let b = self.intern(pair[1]);
                self.degrees[a as usize] += 1;
                self.degrees[b as usize] += 1;
            }
        }
    }

    fn intern(&mut self, osm_id: i64) -> NodeId {
        match self.ids.get(&osm_id) {
            Some(&id) => id,
            None => {
                let id = self.degrees.len() as NodeId;
                self.ids.insert(osm_id, id);
                self.degrees.push(0);
                id
            }
        }
    }

    pub fn node_id(&self, osm_id: i64) -> Option<NodeId> {
        self.ids.get(&osm_id).copied()
    }

    /// Fix the arena layout and move to pass two.
    pub fn into_filler(self) -> GraphFiller {
        let mut nodes = Vec::with_capacity(self.degrees.len());
        let mut next_edge = 0u32;
        for &degree in &self.degrees {
            nodes.push(RoadNode {
                position: [0; 3],
                edge_start: next_edge,
                edge_len: degree,
            });
            next_edge += degree;
        }
        log::info!(
            "pass 1: {} of {} ways kept, {} nodes, {} edge slots",
            self.ways_kept,
            self.ways_seen,
            nodes.len() - 1,
            next_edge
        );
        let placed = vec![false; nodes.len()];
        GraphFiller {
            filter: self.filter,
            ids: self.ids,
            nodes,
            edges: vec![NO_NODE; next_edge as usize],
            placed,
            unknown_refs: 0,
            overfull: 0,
        }
    }
}

/// Pass-two state: position placement and slot filling.
pub struct GraphFiller {
    filter: WayFilter,
    ids: FxHashMap<i64, NodeId>,
    nodes: Vec<RoadNode>,
    edges: Vec<NodeId>,
    placed: Vec<bool>,
    // Deferred anomalies; block callbacks cannot fail, finish() does.
    unknown_refs: u64,
    overfull: u64,
}

impl GraphFiller {
    pub fn fill_block(&mut self, block: &BlockData) {
        for node in &block.nodes {
            if let Some(&id) = self.ids.get(&node.id) {
                self.nodes[id as usize].position = node.pos.to_coords();
                self.placed[id as usize] = true;
            }
        }
        for way in &block.ways {
            if !self.filter.keep(way) {
                continue;
            }
            for pair in way.refs.windows(2) {
                if pair[0] == pair[1] {
                    continue;
                }
                match (self.ids.get(&pair[0]), self.ids.get(&pair[1])) {
                    (Some(&a), Some(&b)) => {
                        self.add_half_edge(a, b);
                        self.add_half_edge(b, a);
                    }
                    _ => self.unknown_refs += 1,
                }
            }
        }
    }

    fn add_half_edge(&mut self, from: NodeId, to: NodeId) {
        let n = self.nodes[from as usize];
        let range = &mut self.edges[n.edge_start as usize..(n.edge_start + n.edge_len) as usize];
        match range.iter_mut().find(|slot| **slot == NO_NODE) {
            Some(slot) => *slot = to,
            None => self.overfull += 1,
        }
    }

    /// Integrity check and handoff. Every node must have a position and
    /// a completely filled adjacency range.
    pub fn finish(self) -> Result<RoadGraph> {
        if self.unknown_refs > 0 || self.overfull > 0 {
            bail!(
                "passes disagree: {} unresolved way references, {} overfull adjacency ranges",
                self.unknown_refs,
                self.overfull
            );
        }
        let unplaced = self
            .placed
            .iter()
            .skip(FIRST_NODE as usize)
            .filter(|&&p| !p)
            .count();
        if unplaced > 0 {
            bail!("{unplaced} way-referenced nodes have no node record");
        }
        let empty = self.edges.iter().filter(|&&e| e == NO_NODE).count();
        if empty > 0 {
            bail!("{empty} adjacency slots left unfilled");
        }
        log::info!(
            "pass 2: graph complete, {} nodes, {} half-edges",
            self.nodes.len() - 1,
            self.edges.len()
        );
        Ok(RoadGraph {
            nodes: self.nodes,
            edges: self.edges,
        })
    }
}

/// Run both passes over a re-openable stream and return the finished
/// graph plus the sparse-to-dense id mapping.
pub fn build_from_pbf<R, F>(
    decoder: &Decoder,
    filter: WayFilter,
    open: F,
) -> Result<(RoadGraph, FxHashMap<i64, NodeId>)>
where
    R: Read + Send,
    F: Fn() -> Result<R>,
{
    build_from_pbf_observed(decoder, filter, open, |_| {})
}

/// Same as [`build_from_pbf`], invoking `phase` after each pipeline
/// phase completes. The hook is observability only; nothing here
/// depends on it.
pub fn build_from_pbf_observed<R, F, H>(
    decoder: &Decoder,
    filter: WayFilter,
    open: F,
    mut phase: H,
) -> Result<(RoadGraph, FxHashMap<i64, NodeId>)>
where
    R: Read + Send,
    F: Fn() -> Result<R>,
    H: FnMut(&str),
{
    let mut builder = GraphBuilder::new(filter);
    decoder
        .read_map(open().context("opening input for pass 1")?, |block| {
            builder.scan_block(block)
        })
        .context("scanning ways")?;
    phase("scan");

    let mut filler = builder.into_filler();
    decoder
        .read_map(open().context("opening input for pass 2")?, |block| {
            filler.fill_block(block)
        })
        .context("filling graph")?;
    phase("fill");

    let ids = filler.ids.clone();
    let graph = filler.finish()?;
    phase("check");
    Ok((graph, ids))
}
