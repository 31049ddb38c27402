//! roadnet - road-network extraction from OpenStreetMap PBF extracts.
//!
//! The pipeline decodes a PBF stream with a worker pool, builds a dense
//! undirected road graph in two passes, indexes the kept nodes in a 3-axis
//! K-D tree for nearest-neighbor snapping, answers point-to-point queries
//! with bidirectional Dijkstra, and condenses pass-through chains for
//! export in the DDSG text format consumed by contraction-hierarchy
//! planners.

pub mod cities;
pub mod forkjoin;
pub mod geo;
pub mod graph;
pub mod kdtree;
pub mod pbf;

pub use forkjoin::ForkJoin;
pub use graph::{shortest_path, Graph, NodeId, RoadGraph};
pub use kdtree::KdTree;
pub use pbf::Decoder;
