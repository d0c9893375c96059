//! Multi-source breadth-first frontier engine.
//!
//! Advances up to `W` BFS sources in lockstep, coding each vertex's visit
//! state as a bitmask word: bit `b` of `visit[v]` is set iff source `b` has
//! reached `v`. This amortises successor-list traversal across every live
//! source at a given depth, the way `webgraph-algo`'s single-threaded
//! `SingleThreadedBreadthFirstVisit` walks one frontier at a time, just
//! generalized from a single bit per vertex (visited/not) to a whole word.

use crate::error::{EngineError, Result};
use crate::graph::GraphProvider;

/// Maximum number of simultaneous BFS sources this engine supports.
pub const MAX_SOURCES: usize = u64::BITS as usize;

/// Per-vertex, per-depth callback invoked once a vertex's frontier bits
/// are finalised for that depth.
///
/// Returning a mask with bits cleared cancels those sources: they will no
/// longer be propagated to this vertex's successors in later depths.
pub trait Visitor {
    fn visit(&mut self, depth: usize, vertex: usize, frontier: u64) -> u64;
}

impl<F: FnMut(usize, usize, u64) -> u64> Visitor for F {
    fn visit(&mut self, depth: usize, vertex: usize, frontier: u64) -> u64 {
        self(depth, vertex, frontier)
    }
}

/// Runs lockstep multi-source BFS from `sources` (each source `i`
/// occupies bit `i` of the frontier) out to `max_depth` hops inclusive,
/// invoking `visitor` once per (depth, vertex) pair with a nonzero
/// frontier in ascending vertex-id order within each depth.
///
/// Fails with [`EngineError::InvalidArgument`] if `sources.len() >
/// MAX_SOURCES` (`spec.md` §7: "more sources than word width").
pub fn msbfs<G: GraphProvider, V: Visitor>(
    graph: &G,
    sources: &[usize],
    max_depth: usize,
    visitor: &mut V,
) -> Result<()> {
    if sources.len() > MAX_SOURCES {
        return Err(EngineError::InvalidArgument(format!(
            "too many MS-BFS sources: {} requested, word width is {MAX_SOURCES}",
            sources.len()
        )));
    }

    let n = graph.num_nodes();
    let mut seen = vec![0u64; n];
    let mut frontier = vec![0u64; n];
    for (bit, &s) in sources.iter().enumerate() {
        if s < n {
            frontier[s] |= 1u64 << bit;
            seen[s] |= 1u64 << bit;
        }
    }

    for depth in 0..=max_depth {
        let live: Vec<usize> = (0..n).filter(|&v| frontier[v] != 0).collect();
        if live.is_empty() {
            break;
        }

        let mut next_frontier = vec![0u64; n];
        // Ascending vertex-id order within the depth; the visitor runs
        // before propagation so a cancelled bit never reaches v's
        // successors at the next depth.
        for &v in &live {
            let bits = frontier[v];
            seen[v] |= bits;
            let surviving = visitor.visit(depth, v, bits) & bits;
            if surviving == 0 {
                continue;
            }
            for s in graph.successors(v) {
                if s < n {
                    next_frontier[s] |= surviving & !seen[s];
                }
            }
        }
        frontier = next_frontier;
    }

    Ok(())
}

/// Computes, for each source, the set of vertices reachable within
/// `max_depth` hops — a thin convenience built on [`msbfs`] for callers
/// that just want reachability rather than per-depth callbacks.
pub fn reachable_sets<G: GraphProvider>(
    graph: &G,
    sources: &[usize],
    max_depth: usize,
) -> Result<Vec<std::collections::HashSet<usize>>> {
    let mut sets = vec![std::collections::HashSet::new(); sources.len()];
    msbfs(graph, sources, max_depth, &mut |_depth, vertex, bits| {
        for bit in 0..sources.len() {
            if bits & (1u64 << bit) != 0 {
                sets[bit].insert(vertex);
            }
        }
        bits
    })?;
    Ok(sets)
}
