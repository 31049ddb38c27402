//! City-pair road distances: snap named places onto the road network
//! with the K-D tree, then route every requested pair over a worker
//! pool and hand the distances in kilometers to a sink.
//!
//! The inputs and output are behind small traits so the pipeline can be
//! fed from CSV files, geocoders, or test fixtures without caring which.

use anyhow::Result;
use crossbeam_channel::bounded;
use rustc_hash::FxHashMap;

use crate::geo::{CityState, SphereCoords};
use crate::graph::dijkstra::path_weight;
use crate::graph::{shortest_path, NodeId, RoadGraph};
use crate::kdtree::KdTree;

/// A named place with its geographic position.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: CityState,
    pub pos: SphereCoords,
}

/// Supplies the places to index.
pub trait LocationSource {
    fn locations(&mut self) -> Result<Vec<Location>>;
}

/// Supplies the place pairs to measure.
pub trait PairSource {
    fn pairs(&mut self) -> Result<Vec<(CityState, CityState)>>;
}

/// Receives one measured distance per routable pair.
pub trait DistanceSink {
    fn record(&mut self, from: &CityState, to: &CityState, km: f64) -> Result<()>;
}

/// A place resolved onto the network: the nearest graph node and how far
/// off the road the place itself sits.
#[derive(Debug, Clone, Copy)]
pub struct Snapped {
    pub node: NodeId,
    pub snap_meters: f64,
}

/// Places snapped onto one road graph.
pub struct CityIndex {
    snapped: FxHashMap<CityState, Snapped>,
}

impl CityIndex {
    /// Snap every sourced location onto the graph. Places with an
    /// unknown position are logged and skipped.
    pub fn build<S: LocationSource>(
        tree: &KdTree<'_, RoadGraph>,
        source: &mut S,
    ) -> Result<CityIndex> {
        let mut snapped = FxHashMap::default();
        for loc in source.locations()? {
            if !loc.pos.defined() {
                log::warn!("skipping {}: unknown position", loc.name);
                continue;
            }
            let Some((node, snap_meters)) = tree.find_nearest_with_distance(loc.pos.to_coords())
            else {
                log::warn!("skipping {}: empty road network", loc.name);
                continue;
            };
            log::debug!("{} at {} snaps {snap_meters:.0}m to node {node}", loc.name, loc.pos);
            snapped.insert(loc.name, Snapped { node, snap_meters });
        }
        log::info!("indexed {} places", snapped.len());
        Ok(CityIndex { snapped })
    }

    pub fn get(&self, name: &CityState) -> Option<Snapped> {
        self.snapped.get(name).copied()
    }
}

/// Route every sourced pair and report its road distance in kilometers:
/// path length plus both snap distances. Pairs naming an unindexed place
/// or spanning disconnected components are logged and skipped; results
/// reach the sink in input order.
pub fn compute_distances<P, S>(
    graph: &RoadGraph,
    index: &CityIndex,
    pairs: &mut P,
    sink: &mut S,
) -> Result<()>
where
    P: PairSource,
    S: DistanceSink,
{
    let mut jobs = Vec::new();
    let mut named = Vec::new();
    for (from, to) in pairs.pairs()? {
        let (Some(a), Some(b)) = (index.get(&from), index.get(&to)) else {
            log::warn!("skipping {from} - {to}: place not indexed");
            continue;
        };
        jobs.push((named.len(), a, b));
        named.push((from, to));
    }

    let workers = num_cpus::get();
    let mut meters: Vec<Option<f64>> = vec![None; jobs.len()];
    std::thread::scope(|scope| {
        let (job_tx, job_rx) = bounded::<(usize, Snapped, Snapped)>(workers * 2);
        let (res_tx, res_rx) = bounded::<(usize, Option<f64>)>(workers * 2);

        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let res_tx = res_tx.clone();
            scope.spawn(move || {
                for (i, a, b) in job_rx.iter() {
                    let path = shortest_path(graph, a.node, b.node);
                    let m = if path.is_empty() {
                        None
                    } else {
                        Some(path_weight(graph, &path) + a.snap_meters + b.snap_meters)
                    };
                    if res_tx.send((i, m)).is_err() {
                        return;
                    }
                }
            });
        }
        drop(job_rx);
        drop(res_tx);

        scope.spawn(move || {
            for job in jobs {
                if job_tx.send(job).is_err() {
                    return;
                }
            }
        });

        for (i, m) in res_rx.iter() {
            meters[i] = m;
        }
    });

    for ((from, to), m) in named.iter().zip(&meters) {
        match m {
            Some(m) => sink.record(from, to, m / 1000.0)?,
            None => log::warn!("no route between {from} and {to}"),
        }
    }
    Ok(())
}
