//! DDSG text export, the edge-list format contraction-hierarchy tools
//! consume: a `d` magic line, a node/edge count line, then one
//! `from to weight direction` line per edge with zero-based node ids,
//! whole-meter weights, and direction 0 (bidirectional).

use std::io::{self, Write};

use super::condense::Edgelist;

pub fn write_ddsg<W: Write>(out: &mut W, node_count: usize, edges: &Edgelist) -> io::Result<()> {
    writeln!(out, "d")?;
    writeln!(out, "{} {}", node_count, edges.len())?;
    for e in edges {
        writeln!(out, "{} {} {} 0", e.from - 1, e.to - 1, e.weight.round() as i64)?;
    }
    Ok(())
}
