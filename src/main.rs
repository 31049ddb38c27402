use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roadnet::graph::{
    build_from_pbf, condense, edgelist_to_graph, graph_to_edgelist, shortest_path, write_ddsg,
    Graph, NodeId, RoadGraph, WayFilter,
};
use roadnet::pbf::Decoder;
use roadnet::KdTree;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "roadnet")]
#[command(about = "Road graph extraction and routing over OpenStreetMap extracts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Condense the road graph and export it as DDSG
    Condense {
        /// Input PBF file
        input: PathBuf,
        /// Output DDSG file
        output: PathBuf,
        /// Keep nodes with more than this many neighbors
        #[arg(long, default_value = "2")]
        min_junction: usize,
    },
    /// Snap a coordinate to the nearest road node
    Nearest {
        /// Input PBF file
        input: PathBuf,
        /// Coordinate (lat,lon)
        #[arg(long)]
        at: String,
    },
    /// Find the shortest road path between two coordinates
    Route {
        /// Input PBF file
        input: PathBuf,
        /// Start coordinate (lat,lon)
        #[arg(long)]
        from: String,
        /// End coordinate (lat,lon)
        #[arg(long)]
        to: String,
    },
    /// Print element counts for a PBF file
    Stats {
        /// Input PBF file
        input: PathBuf,
    },
}

fn parse_coord(s: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        anyhow::bail!("coordinate must be in format 'lat,lon'");
    }
    let lat = parts[0].trim().parse::<f64>()?;
    let lon = parts[1].trim().parse::<f64>()?;
    Ok((lat, lon))
}

fn load_graph(input: &Path) -> Result<(RoadGraph, FxHashMap<i64, NodeId>)> {
    let decoder = Decoder::new();
    let start = Instant::now();
    let built = build_from_pbf(&decoder, WayFilter::default_roads(), || {
        let f = File::open(input).with_context(|| format!("opening {}", input.display()))?;
        Ok(BufReader::new(f))
    })?;
    log::info!("graph built in {:.1}s", start.elapsed().as_secs_f64());
    Ok(built)
}

fn snap(tree: &KdTree<'_, RoadGraph>, coord: &str) -> Result<(NodeId, f64)> {
    let (lat, lon) = parse_coord(coord)?;
    let point = roadnet::geo::SphereCoords::new(lat, lon).to_coords();
    tree.find_nearest_with_distance(point)
        .context("road network is empty")
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Condense {
            input,
            output,
            min_junction,
        } => {
            let (graph, _) = load_graph(&input)?;
            let edges = condense(&graph, |id| graph.neighbors(id).len() > min_junction);
            let renumbered = edgelist_to_graph(&edges);
            let final_edges = graph_to_edgelist(&renumbered);
            log::info!(
                "condensed {} nodes to {}, {} edges",
                graph.count(),
                renumbered.count(),
                final_edges.len()
            );
            let f = File::create(&output)
                .with_context(|| format!("creating {}", output.display()))?;
            let mut w = BufWriter::new(f);
            write_ddsg(&mut w, renumbered.count(), &final_edges)?;
            w.flush()?;
        }
        Commands::Nearest { input, at } => {
            let (graph, _) = load_graph(&input)?;
            let tree = KdTree::build(&graph);
            let (node, meters) = snap(&tree, &at)?;
            let pos = graph.position(node);
            println!("node {node} at distance {meters:.0}m");
            println!(
                "{} neighbors, position {:?}",
                graph.neighbors(node).len(),
                pos
            );
        }
        Commands::Route { input, from, to } => {
            let (graph, _) = load_graph(&input)?;
            let tree = KdTree::build(&graph);
            let (src, src_snap) = snap(&tree, &from)?;
            let (dst, dst_snap) = snap(&tree, &to)?;
            let path = shortest_path(&graph, src, dst);
            if path.is_empty() {
                anyhow::bail!("no route between {from} and {to}");
            }
            let meters: f64 = roadnet::graph::dijkstra::path_weight(&graph, &path);
            println!(
                "{:.1} km over {} nodes ({:.0}m + {:.0}m off-road)",
                meters / 1000.0,
                path.len(),
                src_snap,
                dst_snap
            );
        }
        Commands::Stats { input } => {
            let decoder = Decoder::new();
            let (mut blocks, mut nodes, mut ways, mut relations) = (0u64, 0u64, 0u64, 0u64);
            let f = File::open(&input)
                .with_context(|| format!("opening {}", input.display()))?;
            decoder.read_map(BufReader::new(f), |block| {
                blocks += 1;
                nodes += block.nodes.len() as u64;
                ways += block.ways.len() as u64;
                relations += block.relations.len() as u64;
            })?;
            println!("blocks:     {blocks}");
            println!("nodes:      {nodes}");
            println!("ways:       {ways}");
            println!("relations:  {relations}");
        }
    }
    Ok(())
}
