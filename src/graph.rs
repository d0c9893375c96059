//! The external graph capability surface and the crate's own in-memory
//! mutable graph.
//!
//! [`GraphProvider`] is the minimal capability set the engine needs from
//! any graph representation (`spec.md` §6, §9's "inheritance hierarchy of
//! graph views" design note): the compressed on-disk codec, a plain
//! arc-list, or this crate's [`MutableGraph`] are all just implementors.
//! Grounded on `webgraph-algo`'s pattern of taking a `RandomAccessGraph`
//! bound rather than a concrete type through its algorithms.

use crate::error::{EngineError, Result};
use std::collections::HashSet;

/// Minimal read-only capability set an algorithm needs from a directed
/// graph. Random access (`successors` callable for an arbitrary `v`) is
/// requested but, per `spec.md` §6, not required: callers that only have a
/// sequential provider fall back to [`GraphProvider::iterate_all_edges`].
pub trait GraphProvider {
    fn num_nodes(&self) -> usize;

    fn num_arcs(&self) -> usize;

    fn outdegree(&self, v: usize) -> usize;

    /// Successors of `v` in any consistent order. Empty for an
    /// out-of-range `v` rather than an error, mirroring `spec.md`'s
    /// "lazy iterator yielding -1 at end" contract translated to Rust's
    /// `None`-terminated iterators.
    fn successors(&self, v: usize) -> Box<dyn Iterator<Item = usize> + '_>;

    /// A forward cursor over nodes in id order, starting at `from`.
    fn node_iterator(&self, from: usize) -> NodeIterator<'_, Self>
    where
        Self: Sized,
    {
        NodeIterator::new(self, from)
    }

    /// Visits every arc exactly once. The default implementation walks
    /// `successors` for every node; implementors backed by a sequential
    /// format may override this with a cheaper single pass.
    fn iterate_all_edges(&self, visit: &mut dyn FnMut(usize, usize)) {
        for v in 0..self.num_nodes() {
            for s in self.successors(v) {
                visit(v, s);
            }
        }
    }
}

/// Forward-only cursor over a [`GraphProvider`]'s nodes.
///
/// `successors()` may be called at most once per position; calling it
/// before the first [`Self::next_node`] fails with
/// [`EngineError::InvalidState`], matching `spec.md` §4.C's iterator
/// contract.
pub struct NodeIterator<'a, G: GraphProvider + ?Sized> {
    graph: &'a G,
    next: usize,
    current: Option<usize>,
    successors_taken: bool,
}

impl<'a, G: GraphProvider + ?Sized> NodeIterator<'a, G> {
    fn new(graph: &'a G, from: usize) -> Self {
        Self {
            graph,
            next: from,
            current: None,
            successors_taken: false,
        }
    }

    /// Advances to the next node and returns its id, or `None` once every
    /// node has been visited.
    pub fn next_node(&mut self) -> Option<usize> {
        if self.next >= self.graph.num_nodes() {
            return None;
        }
        let v = self.next;
        self.next += 1;
        self.current = Some(v);
        self.successors_taken = false;
        Some(v)
    }

    /// Successors of the current position. Fails with
    /// [`EngineError::InvalidState`] if called before the first
    /// [`Self::next_node`] or more than once per position.
    pub fn successors(&mut self) -> Result<Box<dyn Iterator<Item = usize> + '_>> {
        let current = self.current.ok_or_else(|| {
            EngineError::InvalidState("successors() called before first next_node()".into())
        })?;
        if self.successors_taken {
            return Err(EngineError::InvalidState(
                "successors() called twice for the same position".into(),
            ));
        }
        self.successors_taken = true;
        Ok(self.graph.successors(current))
    }
}

/// An in-memory directed graph that supports online mutation.
///
/// Dense vertex ids in `0..num_nodes()`. Reverse adjacency is maintained
/// incrementally alongside the forward lists (rather than recomputed on
/// every [`Self::transpose`]) so the vertex cover's incoming-edge scan
/// (`spec.md` §4.D) stays proportional to indegree instead of total arcs;
/// this is an internal bookkeeping detail and does not change the public
/// contract, which still exposes `transpose()` as an independent copy.
#[derive(Debug, Clone, Default)]
pub struct MutableGraph {
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
    num_arcs: usize,
}

impl MutableGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensures vertex `v` exists, growing the dense id space if needed.
    /// Vertex ids are never reassigned or reclaimed.
    pub fn add_node(&mut self, v: usize) {
        if v >= self.successors.len() {
            self.successors.resize_with(v + 1, Vec::new);
            self.predecessors.resize_with(v + 1, Vec::new);
        }
    }

    /// Adds edge `(from, to)`. A duplicate of an existing edge is a no-op,
    /// per `spec.md` §3's "duplicates ignored".
    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.add_node(from.max(to));
        if let Err(pos) = self.successors[from].binary_search(&to) {
            self.successors[from].insert(pos, to);
            match self.predecessors[to].binary_search(&from) {
                Ok(_) => {}
                Err(ppos) => self.predecessors[to].insert(ppos, from),
            }
            self.num_arcs += 1;
        }
    }

    pub fn add_edges<I: IntoIterator<Item = (usize, usize)>>(&mut self, edges: I) {
        for (from, to) in edges {
            self.add_edge(from, to);
        }
    }

    /// Removes edge `(from, to)` if present, returning whether it was.
    pub fn delete_edge(&mut self, from: usize, to: usize) -> bool {
        if from >= self.successors.len() || to >= self.successors.len() {
            return false;
        }
        if let Ok(pos) = self.successors[from].binary_search(&to) {
            self.successors[from].remove(pos);
            if let Ok(ppos) = self.predecessors[to].binary_search(&from) {
                self.predecessors[to].remove(ppos);
            }
            self.num_arcs -= 1;
            true
        } else {
            false
        }
    }

    pub fn predecessors(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.predecessors.get(v).into_iter().flatten().copied()
    }

    pub fn indegree(&self, v: usize) -> usize {
        self.predecessors.get(v).map_or(0, Vec::len)
    }

    /// Builds the transposed graph as an independent copy (teacher's
    /// `copy()`-style value semantics, rather than a lazy view).
    pub fn transpose(&self) -> Self {
        Self {
            successors: self.predecessors.clone(),
            predecessors: self.successors.clone(),
            num_arcs: self.num_arcs,
        }
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Every distinct vertex referenced by any edge or explicit
    /// `add_node` call, as a deduplicated set — used by callers that need
    /// to enumerate affected vertices without assuming density.
    pub fn all_vertex_ids(&self) -> HashSet<usize> {
        (0..self.successors.len()).collect()
    }
}

impl GraphProvider for MutableGraph {
    fn num_nodes(&self) -> usize {
        self.successors.len()
    }

    fn num_arcs(&self) -> usize {
        self.num_arcs
    }

    fn outdegree(&self, v: usize) -> usize {
        self.successors.get(v).map_or(0, Vec::len)
    }

    fn successors(&self, v: usize) -> Box<dyn Iterator<Item = usize> + '_> {
        match self.successors.get(v) {
            Some(list) => Box::new(list.iter().copied()),
            None => Box::new(std::iter::empty()),
        }
    }
}

/// A zero-copy transposed view of a [`MutableGraph`]: `successors(v)`
/// yields `v`'s in-neighbours. Since [`MutableGraph`] already maintains
/// reverse adjacency incrementally, this is just a relabelling rather than
/// a `transpose()` copy — useful for the vertex cover's incoming-edge
/// scan (`spec.md` §4.D), which only ever reads, never mutates.
pub struct Transposed<'a>(pub &'a MutableGraph);

impl<'a> GraphProvider for Transposed<'a> {
    fn num_nodes(&self) -> usize {
        self.0.num_nodes()
    }

    fn num_arcs(&self) -> usize {
        self.0.num_arcs()
    }

    fn outdegree(&self, v: usize) -> usize {
        self.0.indegree(v)
    }

    fn successors(&self, v: usize) -> Box<dyn Iterator<Item = usize> + '_> {
        Box::new(self.0.predecessors(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_edge_is_idempotent_under_duplicates() {
        let mut g = MutableGraph::new();
        g.add_edge(0, 1);
        g.add_edge(0, 1);
        assert_eq!(g.num_arcs(), 1);
        assert_eq!(g.outdegree(0), 1);
    }

    #[test]
    fn num_nodes_tracks_the_highest_referenced_id() {
        let mut g = MutableGraph::new();
        g.add_edge(0, 5);
        assert_eq!(g.num_nodes(), 6);
    }

    #[test]
    fn delete_edge_updates_both_adjacency_directions() {
        let mut g = MutableGraph::new();
        g.add_edge(2, 3);
        assert!(g.delete_edge(2, 3));
        assert_eq!(g.outdegree(2), 0);
        assert_eq!(g.indegree(3), 0);
        assert_eq!(g.num_arcs(), 0);
        assert!(!g.delete_edge(2, 3));
    }

    #[test]
    fn transpose_swaps_successor_and_predecessor_lists() {
        let mut g = MutableGraph::new();
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        let t = g.transpose();
        assert_eq!(t.successors(2).collect::<Vec<_>>(), vec![1]);
        assert_eq!(t.successors(1).collect::<Vec<_>>(), vec![0]);
        assert_eq!(t.num_arcs(), g.num_arcs());
    }

    #[test]
    fn node_iterator_rejects_successors_before_first_advance() {
        let mut g = MutableGraph::new();
        g.add_edge(0, 1);
        let mut it = g.node_iterator(0);
        assert!(it.successors().is_err());
        assert_eq!(it.next_node(), Some(0));
        assert!(it.successors().is_ok());
        assert!(matches!(
            it.successors(),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn transposed_view_matches_predecessors_without_cloning() {
        let mut g = MutableGraph::new();
        g.add_edges([(0, 1), (2, 1)]);
        let view = Transposed(&g);
        let mut preds: Vec<usize> = view.successors(1).collect();
        preds.sort();
        assert_eq!(preds, vec![0, 2]);
        assert_eq!(view.outdegree(1), 2);
    }

    #[test]
    fn iterate_all_edges_visits_every_arc_once() {
        let mut g = MutableGraph::new();
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        g.add_edge(2, 0);
        let mut seen = Vec::new();
        g.iterate_all_edges(&mut |from, to| seen.push((from, to)));
        seen.sort();
        assert_eq!(seen, vec![(0, 1), (1, 2), (2, 0)]);
    }
}
