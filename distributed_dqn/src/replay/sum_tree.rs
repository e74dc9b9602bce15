//! Sum tree for proportional prioritized sampling.
//!
//! Leaves hold sampling weights (`priority^exponent`), internal nodes hold the
//! sum of their children, so drawing an index proportionally to its weight
//! and updating a weight are both O(log N).
//!
//! ```text
//!              [13]
//!            /      \
//!         [4]        [9]
//!        /   \      /   \
//!      [1]   [3]  [8]   [1]     <- leaves = weights
//! ```

/// Array-backed sum tree.
///
/// Internal nodes occupy `0..capacity-1`, leaves occupy
/// `capacity-1..2*capacity-1`; node `i` has children `2i+1` and `2i+2`.
#[derive(Debug, Clone)]
pub struct SumTree {
    nodes: Vec<f64>,
    capacity: usize,
}

impl SumTree {
    /// Create a new sum tree with `capacity` zero-weight leaves.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "SumTree capacity must be > 0");
        Self {
            nodes: vec![0.0; 2 * capacity - 1],
            capacity,
        }
    }

    /// Set the weight of leaf `idx`.
    ///
    /// Ancestors are recomputed from their children rather than adjusted by a
    /// delta so rounding error cannot accumulate over long runs.
    pub fn set(&mut self, idx: usize, weight: f64) {
        debug_assert!(idx < self.capacity, "leaf index out of range");
        debug_assert!(
            weight >= 0.0 && weight <= self.max_weight(),
            "invalid weight {}",
            weight
        );

        let mut node = self.capacity - 1 + idx;
        self.nodes[node] = weight;
        while node > 0 {
            node = (node - 1) / 2;
            let left = 2 * node + 1;
            self.nodes[node] = self.nodes[left] + self.nodes[left + 1];
        }
    }

    /// Largest leaf weight for which a full tree of `capacity` leaves still
    /// has a finite total.
    pub fn weight_limit(capacity: usize) -> f64 {
        f64::MAX / (2.0 * capacity.max(1) as f64)
    }

    /// `weight_limit` for this tree.
    pub fn max_weight(&self) -> f64 {
        Self::weight_limit(self.capacity)
    }

    /// Weight of leaf `idx`.
    pub fn get(&self, idx: usize) -> f64 {
        self.nodes[self.capacity - 1 + idx]
    }

    /// Find the leaf whose cumulative weight range contains `value`.
    ///
    /// `value` is expected in `[0, total)`. Zero-weight subtrees are never
    /// entered on the left side because the comparison is strict.
    pub fn find(&self, value: f64) -> usize {
        let mut value = value;
        let mut node = 0;

        while node < self.capacity - 1 {
            let left = 2 * node + 1;
            let right = left + 1;

            if value < self.nodes[left] {
                node = left;
            } else {
                value -= self.nodes[left];
                node = right;
            }
        }

        node - (self.capacity - 1)
    }

    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.nodes[0]
    }

    /// Index of the heaviest leaf, if any leaf has positive weight.
    pub fn argmax(&self) -> Option<usize> {
        let leaves = &self.nodes[self.capacity - 1..];
        leaves
            .iter()
            .enumerate()
            .filter(|(_, &w)| w > 0.0)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }

    /// Number of leaves.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_tracks_updates() {
        let mut tree = SumTree::new(4);
        tree.set(0, 1.0);
        tree.set(1, 3.0);
        tree.set(2, 8.0);
        tree.set(3, 1.0);
        assert_eq!(tree.total(), 13.0);

        tree.set(2, 0.0);
        assert_eq!(tree.total(), 5.0);
    }

    #[test]
    fn test_find_maps_ranges_to_leaves() {
        let mut tree = SumTree::new(4);
        tree.set(0, 1.0);
        tree.set(1, 3.0);
        tree.set(2, 8.0);
        tree.set(3, 1.0);

        assert_eq!(tree.find(0.0), 0);
        assert_eq!(tree.find(0.99), 0);
        assert_eq!(tree.find(1.0), 1);
        assert_eq!(tree.find(3.99), 1);
        assert_eq!(tree.find(4.0), 2);
        assert_eq!(tree.find(11.99), 2);
        assert_eq!(tree.find(12.5), 3);
    }

    #[test]
    fn test_find_skips_zero_weight_leaves() {
        let mut tree = SumTree::new(3);
        tree.set(0, 0.0);
        tree.set(1, 2.0);
        tree.set(2, 0.0);

        for v in [0.0, 0.5, 1.0, 1.999] {
            assert_eq!(tree.find(v), 1);
        }
    }

    #[test]
    fn test_non_power_of_two_capacity() {
        let mut tree = SumTree::new(5);
        for i in 0..5 {
            tree.set(i, (i + 1) as f64);
        }
        assert_eq!(tree.total(), 15.0);
        for i in 0..5 {
            assert_eq!(tree.get(i), (i + 1) as f64);
        }
    }

    #[test]
    fn test_single_leaf() {
        let mut tree = SumTree::new(1);
        tree.set(0, 4.0);
        assert_eq!(tree.total(), 4.0);
        assert_eq!(tree.find(3.0), 0);
    }

    #[test]
    fn test_total_of_limit_weights_is_finite() {
        let capacity = 7;
        let mut tree = SumTree::new(capacity);
        for i in 0..capacity {
            tree.set(i, tree.max_weight());
        }
        assert!(tree.total().is_finite());
        assert!(tree.total() <= f64::MAX);
        assert_eq!(tree.find(tree.total() * 0.99), capacity - 1);
    }

    #[test]
    fn test_argmax() {
        let mut tree = SumTree::new(4);
        assert_eq!(tree.argmax(), None);
        tree.set(1, 2.0);
        tree.set(3, 5.0);
        assert_eq!(tree.argmax(), Some(3));
    }
}
