//! Top-node watcher: flags vertices whose neighbourhood count grew sharply
//! in a single update batch.
//!
//! No direct teacher analogue; the debounced-callback idiom is borrowed
//! from the same "accumulate, then invoke a boxed callback once a
//! threshold is crossed" shape the pack's producer/consumer examples use,
//! adapted to a capacity-bounded ranked set instead of a queue.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// One (ratio, vertex) observation in the watcher's pending set.
///
/// Ordered by descending ratio, vertex id breaking ties, so the set's
/// natural iteration order is "biggest jump first" and the smallest-ratio
/// entry — the first one to evict once [`TopNodeWatcherBuilder::counter_capacity`]
/// is exceeded — is always the set's last element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedVertex {
    pub ratio: f64,
    pub vertex: usize,
}

impl Eq for RankedVertex {}

impl PartialOrd for RankedVertex {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedVertex {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .ratio
            .total_cmp(&self.ratio)
            .then_with(|| self.vertex.cmp(&other.vertex))
    }
}

/// Builder for [`TopNodeWatcher`].
pub struct TopNodeWatcherBuilder {
    target_hop: usize,
    percentage_change: f64,
    min_node_count: f64,
    counter_capacity: usize,
    update_interval: Duration,
}

impl Default for TopNodeWatcherBuilder {
    fn default() -> Self {
        Self {
            target_hop: 1,
            percentage_change: 1.5,
            min_node_count: 1.0,
            counter_capacity: 16,
            update_interval: Duration::from_millis(0),
        }
    }
}

impl TopNodeWatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The hop `h` whose counters are snapshotted and compared.
    pub fn target_hop(mut self, h: usize) -> Self {
        self.target_hop = h;
        self
    }

    /// Minimum `count_after / count_before` ratio a vertex must reach to
    /// be recorded.
    pub fn percentage_change(mut self, ratio: f64) -> Self {
        self.percentage_change = ratio;
        self
    }

    /// Minimum `count_after` a vertex must reach, independent of ratio,
    /// to be recorded — filters out noisy ratios among tiny counts.
    pub fn min_node_count(mut self, n: f64) -> Self {
        self.min_node_count = n;
        self
    }

    /// Caps how many ranked vertices the pending set holds at once; the
    /// smallest-ratio entry is evicted first once the cap is exceeded.
    pub fn counter_capacity(mut self, n: usize) -> Self {
        self.counter_capacity = n;
        self
    }

    pub fn update_interval_ms(mut self, ms: u64) -> Self {
        self.update_interval = Duration::from_millis(ms);
        self
    }

    pub fn build(
        self,
        callback: Box<dyn FnMut(&BTreeSet<RankedVertex>) + Send>,
    ) -> TopNodeWatcher {
        TopNodeWatcher {
            target_hop: self.target_hop,
            percentage_change: self.percentage_change,
            min_node_count: self.min_node_count,
            counter_capacity: self.counter_capacity.max(1),
            update_interval: self.update_interval,
            last_fired: None,
            pending: BTreeSet::new(),
            callback,
        }
    }
}

/// Accumulates (ratio, vertex) observations across update batches and
/// fires a debounced callback once the pending set is non-empty and
/// [`TopNodeWatcherBuilder::update_interval_ms`] has elapsed since the
/// last fire (`spec.md` §4.G).
pub struct TopNodeWatcher {
    target_hop: usize,
    percentage_change: f64,
    min_node_count: f64,
    counter_capacity: usize,
    update_interval: Duration,
    last_fired: Option<Instant>,
    pending: BTreeSet<RankedVertex>,
    callback: Box<dyn FnMut(&BTreeSet<RankedVertex>) + Send>,
}

impl TopNodeWatcher {
    pub fn target_hop(&self) -> usize {
        self.target_hop
    }

    /// The pending set as it currently stands, without forcing a fire.
    /// Exposed for tests that check idempotence across repeated batches.
    pub fn pending(&self) -> &BTreeSet<RankedVertex> {
        &self.pending
    }

    /// Folds in one update batch's (vertex, count_before, count_after)
    /// observations, then fires the callback if due.
    ///
    /// `count_before == 0.0` is coerced to `1.0` before the ratio is
    /// computed, per `spec.md` §4.G step 1, so a brand-new vertex's first
    /// nonzero count doesn't read as an infinite ratio.
    pub fn observe(&mut self, observations: impl IntoIterator<Item = (usize, f64, f64)>) {
        for (vertex, before, after) in observations {
            let before = if before == 0.0 { 1.0 } else { before };
            let ratio = after / before;
            if ratio >= self.percentage_change && after >= self.min_node_count {
                self.insert_capped(RankedVertex { ratio, vertex });
            }
        }
        self.maybe_fire();
    }

    fn insert_capped(&mut self, entry: RankedVertex) {
        self.pending.insert(entry);
        while self.pending.len() > self.counter_capacity {
            if let Some(worst) = self.pending.iter().next_back().copied() {
                self.pending.remove(&worst);
            } else {
                break;
            }
        }
    }

    fn maybe_fire(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let now = Instant::now();
        let due = match self.last_fired {
            None => true,
            Some(last) => now.duration_since(last) >= self.update_interval,
        };
        if due {
            (self.callback)(&self.pending);
            self.pending.clear();
            self.last_fired = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn counting_watcher(fired: Arc<Mutex<Vec<Vec<RankedVertex>>>>) -> TopNodeWatcher {
        TopNodeWatcherBuilder::new()
            .target_hop(1)
            .percentage_change(1.5)
            .min_node_count(1.0)
            .counter_capacity(2)
            .update_interval_ms(0)
            .build(Box::new(move |set| {
                fired.lock().unwrap().push(set.iter().copied().collect());
            }))
    }

    #[test]
    fn ratio_below_threshold_is_not_recorded() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut watcher = counting_watcher(fired.clone());
        watcher.observe([(0usize, 10.0, 12.0)]); // ratio 1.2 < 1.5
        assert!(fired.lock().unwrap().is_empty());
    }

    #[test]
    fn zero_before_is_coerced_to_one() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut watcher = counting_watcher(fired.clone());
        watcher.observe([(3usize, 0.0, 2.0)]); // ratio 2.0 / 1.0 = 2.0 >= 1.5
        let calls = fired.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].vertex, 3);
    }

    #[test]
    fn capacity_evicts_the_smallest_ratio_first() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut watcher = counting_watcher(fired.clone());
        watcher.observe([(0usize, 1.0, 10.0), (1usize, 1.0, 2.0), (2usize, 1.0, 5.0)]);
        let calls = fired.lock().unwrap();
        let fired_vertices: Vec<usize> = calls[0].iter().map(|r| r.vertex).collect();
        assert_eq!(fired_vertices, vec![0, 2]); // ratio 10 then 5; ratio 2 (vertex 1) evicted
    }

    #[test]
    fn debounce_holds_back_until_interval_elapses() {
        let fired: Arc<Mutex<Vec<Vec<RankedVertex>>>> = Arc::new(Mutex::new(Vec::new()));
        let mut watcher = TopNodeWatcherBuilder::new()
            .percentage_change(1.5)
            .min_node_count(1.0)
            .update_interval_ms(50)
            .build(Box::new({
                let fired = fired.clone();
                move |set| fired.lock().unwrap().push(set.iter().copied().collect())
            }));
        watcher.observe([(0usize, 1.0, 10.0)]);
        assert!(fired.lock().unwrap().is_empty(), "first batch holds in pending");
        assert_eq!(watcher.pending().len(), 1);
        std::thread::sleep(Duration::from_millis(60));
        watcher.observe([(1usize, 1.0, 10.0)]);
        assert_eq!(fired.lock().unwrap().len(), 1);
    }

    #[test]
    fn repeating_a_batch_that_changes_nothing_is_idempotent() {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let mut watcher = counting_watcher(fired.clone());
        watcher.observe([(0usize, 1.0, 10.0)]);
        let first_snapshot = fired.lock().unwrap().clone();
        // A repeat application with identical before/after (nothing in the
        // graph actually changed the second time) never clears the
        // 1.5x bar, so it adds nothing new.
        watcher.observe([(0usize, 10.0, 10.0)]);
        let second_snapshot = fired.lock().unwrap().clone();
        assert_eq!(first_snapshot, second_snapshot);
    }
}
