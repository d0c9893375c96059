//! The dynamic approximate neighbourhood function engine.
//!
//! Orchestrates the packed counter array, the mutable graph, the vertex
//! cover, and multi-source BFS to answer `count(v, h)` ≈ `|B(v, h)|` and to
//! keep that answer current as edges stream in. Grounded on
//! `webgraph-algo`'s `HyperBall`: the builder mirrors `HyperBallBuilder`'s
//! fluent-setter style, and the initial bootstrap is the same iterative
//! register-wise-max construction `HyperBall::iterate` performs, just run
//! to convergence once up front instead of being the whole algorithm.

use crate::counters::{PackedCounterArray, PackedCounterArrayBuilder};
use crate::error::{EngineError, Result};
use crate::graph::{GraphProvider, MutableGraph, Transposed};
use std::collections::HashSet;

use dsi_progress_logger::ProgressLog;

/// Builder for [`NeighbourhoodEngine`], mirroring `webgraph-algo`'s
/// `HyperBallBuilder` fluent-setter idiom.
pub struct NeighbourhoodEngineBuilder {
    max_hops: usize,
    log_2_num_registers: usize,
    num_elements_upper_bound: usize,
    seed: u64,
}

impl Default for NeighbourhoodEngineBuilder {
    fn default() -> Self {
        Self {
            max_hops: 4,
            log_2_num_registers: 7,
            num_elements_upper_bound: 1 << 20,
            seed: 0,
        }
    }
}

impl NeighbourhoodEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `H`, the maximum hop distance the engine will answer queries for.
    pub fn max_hops(mut self, max_hops: usize) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn log_2_num_registers(mut self, log_2_num_registers: usize) -> Self {
        self.log_2_num_registers = log_2_num_registers;
        self
    }

    pub fn rsd(mut self, rsd: f64) -> Self {
        self.log_2_num_registers = crate::counters::log_2_number_of_registers(rsd);
        self
    }

    pub fn num_elements_upper_bound(mut self, n: usize) -> Self {
        self.num_elements_upper_bound = n;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builds the engine over the starting graph `g0`, running the
    /// initial vertex-cover construction and static HyperBall bootstrap
    /// described in `spec.md` §4.F, without progress reporting.
    pub fn build(self, graph: MutableGraph) -> Result<NeighbourhoodEngine> {
        let mut pl = dsi_progress_logger::ProgressLogger::default();
        self.build_with_progress(graph, &mut pl)
    }

    /// Same as [`Self::build`] but threads a caller-owned progress logger
    /// through the two expensive passes, matching the teacher's
    /// `HyperBall::run(.., pl)` style of accepting logging from the
    /// caller rather than constructing it internally.
    pub fn build_with_progress<P: ProgressLog>(
        self,
        graph: MutableGraph,
        pl: &mut P,
    ) -> Result<NeighbourhoodEngine> {
        let n = graph.num_nodes();
        let mut vertex_cover = crate::vertex_cover::VertexCover::new();

        pl.start("computing initial vertex cover");
        graph.iterate_all_edges(&mut |from, to| {
            vertex_cover.insert_edge(from, to);
            pl.update();
        });
        pl.done();

        let mut engine = NeighbourhoodEngine {
            graph,
            vertex_cover,
            max_hops: self.max_hops,
            log_2_num_registers: self.log_2_num_registers,
            num_elements_upper_bound: self.num_elements_upper_bound,
            seed: self.seed,
            counters: Vec::new(),
        };

        let mut c0 = engine.new_array(n)?;
        for v in 0..n {
            c0.add(v, v);
        }
        engine.counters.push(c0);

        pl.start("running static bootstrap");
        for h in 1..=engine.max_hops {
            let mut next = engine.new_array(n)?;
            for v in 0..n {
                next.union_counters(v, &engine.counters[h - 1], v)?;
                for w in engine.graph.successors(v) {
                    next.union_counters(v, &engine.counters[h - 1], w)?;
                }
                pl.update();
            }
            engine.counters.push(next);
        }
        pl.done();

        // Only vertex-cover members keep dense backing beyond hop 0; the
        // rest is discarded immediately and recomputed on demand by
        // `count`.
        for h in 1..=engine.max_hops {
            for v in 0..n {
                if !engine.vertex_cover.is_in_vertex_cover(v) {
                    engine.counters[h].clear_counter(v);
                }
            }
        }

        Ok(engine)
    }
}

/// Orchestrates the packed counter array (A), the mutable graph (C), the
/// vertex cover (D), and multi-source BFS (E) to maintain and query an
/// approximate neighbourhood function over a graph mutated online.
pub struct NeighbourhoodEngine {
    graph: MutableGraph,
    vertex_cover: crate::vertex_cover::VertexCover,
    max_hops: usize,
    log_2_num_registers: usize,
    num_elements_upper_bound: usize,
    seed: u64,
    /// `counters[h][v]` estimates `|B(v, h)|`, dense for every `v` at
    /// `h = 0` and dense only for vertex-cover members at `h >= 1`.
    counters: Vec<PackedCounterArray>,
}

/// Returns a length-1 scratch array holding `C_h[v]`, either read
/// directly (vertex-cover members) or recomputed on the fly.
///
/// For a non-cover vertex, `C_h[v] = {v} ∪ ⋃_{w ∈ succ(v)} C_{h-1}[w]`: this
/// is the exact recursive definition of a ball of radius h (it never needs
/// v's own `C_{h-1}[v]`, which non-cover vertices don't keep stored), so the
/// recursion bottoms out at hop 0's densely-kept identity sets.
///
/// Free-standing rather than a `&self` method so it can be called from
/// inside an [`crate::msbfs::msbfs`] visitor closure without that closure
/// needing to capture all of `self` (which would conflict with the
/// `&self.graph` reference the same `msbfs` call already borrows).
fn counter_at_parts(
    graph: &MutableGraph,
    vertex_cover: &crate::vertex_cover::VertexCover,
    counters: &[PackedCounterArray],
    v: usize,
    h: usize,
) -> Result<PackedCounterArray> {
    if h == 0 {
        return counters[0].extract(&[v]);
    }
    if vertex_cover.is_in_vertex_cover(v) {
        return counters[h].extract(&[v]);
    }
    let mut scratch = counters[0].extract(&[v])?;
    for w in graph.successors(v) {
        let w_counter = counter_at_parts(graph, vertex_cover, counters, w, h - 1)?;
        scratch.union_counters(0, &w_counter, 0)?;
    }
    Ok(scratch)
}

impl NeighbourhoodEngine {
    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    pub fn num_nodes(&self) -> usize {
        self.graph.num_nodes()
    }

    pub fn graph(&self) -> &MutableGraph {
        &self.graph
    }

    pub fn vertex_cover(&self) -> &crate::vertex_cover::VertexCover {
        &self.vertex_cover
    }

    fn new_array(&self, len: usize) -> Result<PackedCounterArray> {
        PackedCounterArrayBuilder::new()
            .log_2_num_registers(self.log_2_num_registers)
            .num_elements_upper_bound(self.num_elements_upper_bound)
            .seed(self.seed)
            .build(len)
    }

    /// Grows every per-hop counter array to cover vertex ids up to
    /// `new_num_nodes - 1`, seeding the identity set for newly introduced
    /// vertices at hop 0.
    fn grow_counters_to(&mut self, new_num_nodes: usize) -> Result<()> {
        for (h, array) in self.counters.iter_mut().enumerate() {
            let old_len = array.len();
            if new_num_nodes > old_len {
                array.add_counters(new_num_nodes - old_len)?;
                if h == 0 {
                    for v in old_len..new_num_nodes {
                        array.add(v, v);
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns a length-1 scratch array holding `C_h[v]`, either read
    /// directly (vertex-cover members) or recomputed on the fly.
    fn counter_at(&self, v: usize, h: usize) -> Result<PackedCounterArray> {
        counter_at_parts(&self.graph, &self.vertex_cover, &self.counters, v, h)
    }

    /// Estimates `|B(v, h)|`. An out-of-range `v` reads as zero rather
    /// than failing, per `spec.md` §7's `NotFound` policy.
    pub fn count(&self, v: usize, h: usize) -> Result<f64> {
        if h > self.max_hops {
            return Err(EngineError::InvalidArgument(format!(
                "hop {h} exceeds the engine's configured max_hops {}",
                self.max_hops
            )));
        }
        if v >= self.graph.num_nodes() {
            return Ok(0.0);
        }
        Ok(self.counter_at(v, h)?.count(0))
    }

    /// Sums `count(v, h)` over every `v` at each hop, the same diagnostic
    /// the static `HyperBall` exposes as its neighbourhood function.
    ///
    /// Accumulated with Kahan summation, since a plain running `f64` total
    /// over a large vertex set loses precision exactly where the static
    /// `HyperBall` guards against it when cumulating its own neighbourhood
    /// function deltas.
    pub fn neighbourhood_function(&self) -> Result<Vec<f64>> {
        let mut totals = Vec::with_capacity(self.max_hops + 1);
        for h in 0..=self.max_hops {
            let mut total = kahan::KahanSum::new_with_value(0.0);
            for v in 0..self.graph.num_nodes() {
                total += self.count(v, h)?;
            }
            totals.push(total.sum());
        }
        Ok(totals)
    }

    /// Recomputes `C_h[v]` from `C_{h-1}` for every `v` in `affected`, in
    /// strict increasing order of `h`, since every `C_h` depends only on
    /// the already-updated `C_{h-1}`. Cover members are recomputed in
    /// batches of at most [`msbfs::MAX_SOURCES`] using [`msbfs::msbfs`], so
    /// several vertices that share a successor only pay for that
    /// successor's `(h-1)` counter once per batch.
    fn recompute_affected(&mut self, affected: &HashSet<usize>) -> Result<()> {
        if affected.is_empty() {
            return Ok(());
        }
        let mut ordered: Vec<usize> = affected.iter().copied().collect();
        ordered.sort_unstable();

        for h in 1..=self.max_hops {
            let mut cover_members = Vec::new();
            for &v in &ordered {
                if self.vertex_cover.is_in_vertex_cover(v) {
                    cover_members.push(v);
                } else {
                    // A vertex that just left the cover may still hold
                    // stale dense registers from when it was a member;
                    // drop them so `counter_at` falls through to on-demand
                    // recomputation instead of reading garbage.
                    self.counters[h].clear_counter(v);
                }
            }
            for batch in cover_members.chunks(crate::msbfs::MAX_SOURCES) {
                self.recompute_hop_batch(h, batch)?;
            }
        }
        Ok(())
    }

    /// Recomputes `C_h[v]` for every `v` in `batch` (all cover members, all
    /// sharing the same `h`) in one pass: `batch` is treated as the source
    /// set of a depth-1 [`msbfs::msbfs`] run, so a successor reachable from
    /// several sources has its `(h-1)` counter computed only once.
    fn recompute_hop_batch(&mut self, h: usize, batch: &[usize]) -> Result<()> {
        let mut accumulators = Vec::with_capacity(batch.len());
        for &v in batch {
            let mut acc = self.new_array(1)?;
            acc.union_counters(0, &self.counters[h - 1], v)?;
            accumulators.push(acc);
        }

        let mut w_cache: std::collections::HashMap<usize, PackedCounterArray> =
            std::collections::HashMap::new();
        let mut error: Option<EngineError> = None;

        // Borrow the three pieces `counter_at_parts` needs up front, as
        // plain shared references, so the closure below never needs to
        // capture `self` itself (which would conflict with `&self.graph`
        // being borrowed for the `msbfs` call at the same time).
        let graph = &self.graph;
        let vertex_cover = &self.vertex_cover;
        let counters = &self.counters;

        crate::msbfs::msbfs(graph, batch, 1, &mut |depth, w, bits| {
            if depth == 0 || error.is_some() {
                return bits;
            }
            if !w_cache.contains_key(&w) {
                match counter_at_parts(graph, vertex_cover, counters, w, h - 1) {
                    Ok(c) => {
                        w_cache.insert(w, c);
                    }
                    Err(e) => {
                        error = Some(e);
                        return bits;
                    }
                }
            }
            let w_counter = w_cache.get(&w).expect("just inserted above");
            for (bit, acc) in accumulators.iter_mut().enumerate() {
                if bits & (1u64 << bit) != 0 {
                    if let Err(e) = acc.union_counters(0, w_counter, 0) {
                        error = Some(e);
                        return bits;
                    }
                }
            }
            bits
        })?;

        if let Some(e) = error {
            return Err(e);
        }

        for (i, &v) in batch.iter().enumerate() {
            accumulators[i].transfer_at(0, &mut self.counters[h], v)?;
        }
        Ok(())
    }

    /// Applies a batch of new edges, updating the vertex cover and
    /// recomputing every affected vertex's hop counters. Validates and
    /// grows storage for the whole batch before mutating anything, so a
    /// batch either fully applies or (on an internal error) leaves the
    /// pre-batch state untouched.
    pub fn add_edges(&mut self, batch: &[(usize, usize)]) -> Result<HashSet<usize>> {
        if batch.is_empty() {
            return Ok(HashSet::new());
        }

        let highest = batch
            .iter()
            .flat_map(|&(a, b)| [a, b])
            .max()
            .unwrap_or(0);
        if highest + 1 > self.graph.num_nodes() {
            self.grow_counters_to(highest + 1)?;
        }

        let mut affected = HashSet::new();
        for &(from, to) in batch {
            self.graph.add_edge(from, to);
            let delta = self.vertex_cover.insert_edge(from, to);
            affected.extend(delta.into_keys());
        }

        self.recompute_affected(&affected)?;
        Ok(affected)
    }

    /// Same as [`Self::add_edges`], but snapshots `count(v, watcher.target_hop())`
    /// for every vertex the batch could possibly touch *before* applying
    /// it, then feeds the (before, after) pairs for the vertices the
    /// vertex cover actually marked affected into `watcher` (`spec.md`
    /// §4.G). Inserting an edge only ever affects its two endpoints
    /// (unlike deletion's repair pass, which can reach third parties), so
    /// the pre-batch snapshot is exactly the batch's distinct endpoints.
    pub fn add_edges_watched(
        &mut self,
        batch: &[(usize, usize)],
        watcher: &mut crate::watcher::TopNodeWatcher,
    ) -> Result<HashSet<usize>> {
        let h = watcher.target_hop().min(self.max_hops);
        let touched: HashSet<usize> = batch.iter().flat_map(|&(a, b)| [a, b]).collect();
        let mut before = std::collections::HashMap::new();
        for &v in &touched {
            before.insert(v, self.count(v, h)?);
        }

        let affected = self.add_edges(batch)?;

        let mut observations = Vec::with_capacity(affected.len());
        for &v in &affected {
            let before_v = before.get(&v).copied().unwrap_or(0.0);
            let after_v = self.count(v, h)?;
            observations.push((v, before_v, after_v));
        }
        watcher.observe(observations);

        Ok(affected)
    }

    /// Removes a batch of edges, updating the vertex cover (via an
    /// incoming-edge scan over the graph's incrementally-maintained
    /// reverse adjacency) and recomputing every affected vertex.
    pub fn delete_edges(&mut self, batch: &[(usize, usize)]) -> Result<HashSet<usize>> {
        let mut affected = HashSet::new();
        for &(from, to) in batch {
            self.graph.delete_edge(from, to);
            let transpose = Transposed(&self.graph);
            let delta = self
                .vertex_cover
                .delete_edge(&self.graph, Some(&transpose), from, to)?;
            affected.extend(delta.into_keys());
        }
        self.recompute_affected(&affected)?;
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_engine(graph: MutableGraph, max_hops: usize) -> NeighbourhoodEngine {
        NeighbourhoodEngineBuilder::new()
            .max_hops(max_hops)
            .log_2_num_registers(7)
            .num_elements_upper_bound(30)
            .seed(0)
            .build(graph)
            .unwrap()
    }

    #[test]
    fn identity_single_vertex() {
        let mut graph = MutableGraph::new();
        graph.add_node(0);
        let engine = small_engine(graph, 3);
        for h in 0..=3 {
            assert!((engine.count(0, h).unwrap() - 1.0).abs() < 0.3);
        }
    }

    #[test]
    fn triangle_counts_grow_as_expected() {
        let mut graph = MutableGraph::new();
        graph.add_edges([(0, 1), (1, 2), (2, 0)]);
        let engine = small_engine(graph, 2);
        for v in 0..3 {
            let c1 = engine.count(v, 1).unwrap();
            let c2 = engine.count(v, 2).unwrap();
            assert!((c1 - 2.0).abs() / 2.0 < 0.25, "hop1 estimate {c1}");
            assert!((c2 - 3.0).abs() / 3.0 < 0.25, "hop2 estimate {c2}");
        }
    }

    #[test]
    fn monotonic_in_hops() {
        let mut graph = MutableGraph::new();
        graph.add_edges([(0, 1), (1, 2), (2, 3), (3, 4)]);
        let engine = small_engine(graph, 4);
        for v in 0..5 {
            let mut prev = engine.count(v, 0).unwrap();
            for h in 1..=4 {
                let cur = engine.count(v, h).unwrap();
                assert!(
                    cur + 1.0 >= prev,
                    "count should not shrink much with more hops: {prev} -> {cur}"
                );
                prev = cur;
            }
        }
    }

    #[test]
    fn count_never_exceeds_num_nodes() {
        let mut graph = MutableGraph::new();
        graph.add_edges([(0, 1), (1, 2), (2, 0), (1, 3)]);
        let engine = small_engine(graph, 5);
        let n = engine.num_nodes() as f64;
        for v in 0..engine.num_nodes() {
            for h in 0..=5 {
                assert!(engine.count(v, h).unwrap() <= n + 2.0);
            }
        }
    }

    #[test]
    fn add_edges_keeps_vertex_cover_invariant() {
        let graph = MutableGraph::new();
        let mut engine = small_engine(graph, 2);
        engine.add_edges(&[(0, 1), (2, 3), (1, 2)]).unwrap();
        let mut edges = Vec::new();
        engine
            .graph()
            .iterate_all_edges(&mut |a, b| edges.push((a, b)));
        for (a, b) in edges {
            assert!(
                engine.vertex_cover().is_in_vertex_cover(a)
                    || engine.vertex_cover().is_in_vertex_cover(b)
            );
        }
    }

    #[test]
    fn add_edges_watched_feeds_the_watcher_with_actually_affected_vertices() {
        use crate::watcher::TopNodeWatcherBuilder;
        use std::sync::{Arc, Mutex};

        let graph = MutableGraph::new();
        let mut engine = small_engine(graph, 2);
        let fired: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let fired_clone = fired.clone();
        let mut watcher = TopNodeWatcherBuilder::new()
            .target_hop(1)
            .percentage_change(1.0)
            .min_node_count(0.0)
            .update_interval_ms(0)
            .build(Box::new(move |set| {
                fired_clone
                    .lock()
                    .unwrap()
                    .extend(set.iter().map(|r| r.vertex));
            }));

        engine.add_edges_watched(&[(0, 1)], &mut watcher).unwrap();
        let seen = fired.lock().unwrap().clone();
        assert!(seen.contains(&0));
        assert!(seen.contains(&1));
    }

    #[test]
    fn out_of_range_vertex_is_a_zero_count_not_an_error() {
        let graph = MutableGraph::new();
        let engine = small_engine(graph, 1);
        assert_eq!(engine.count(500, 0).unwrap(), 0.0);
    }
}
