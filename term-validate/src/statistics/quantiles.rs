//! Mergeable quantile sketch backing medians and histograms.
//!
//! A KLL-style stack of compactors: level `L` holds items that each stand for
//! `2^L` original values. While fewer than `k` values have been added nothing
//! is compacted, so every answer is exact. Compaction alternates between
//! keeping odd and even positions, which keeps runs reproducible for the same
//! input order.

use crate::error::{Result, TermError};
use std::cmp::Ordering;

/// Smallest capacity of any compactor level.
const MIN_LEVEL_CAPACITY: usize = 4;

#[derive(Debug, Clone)]
struct Compactor {
    capacity: usize,
    items: Vec<f64>,
    sorted: bool,
    keep_odd: bool,
}

impl Compactor {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::new(),
            sorted: true,
            keep_odd: false,
        }
    }

    fn push(&mut self, value: f64) {
        self.items.push(value);
        self.sorted = false;
    }

    fn extend(&mut self, values: &[f64]) {
        self.items.extend_from_slice(values);
        self.sorted = false;
    }

    fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    fn ensure_sorted(&mut self) {
        if !self.sorted {
            self.items.sort_by(cmp_f64);
            self.sorted = true;
        }
    }

    /// Halves the compactor, returning the items promoted to the next level.
    fn compact(&mut self) -> Vec<f64> {
        self.ensure_sorted();

        let mut promoted = Vec::with_capacity(self.items.len() / 2 + 1);
        let mut retained = Vec::new();

        // An odd item out stays behind so the promoted run has even length.
        let pairs_end = self.items.len() - self.items.len() % 2;
        for (i, &item) in self.items[..pairs_end].iter().enumerate() {
            if (i % 2 == 1) == self.keep_odd {
                promoted.push(item);
            }
        }
        if pairs_end < self.items.len() {
            retained.push(self.items[pairs_end]);
        }

        self.keep_odd = !self.keep_odd;
        self.items = retained;
        self.sorted = true;
        promoted
    }
}

fn cmp_f64(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Approximate quantiles over a stream of finite `f64` values.
///
/// ```rust
/// use term_validate::statistics::quantiles::QuantileSketch;
///
/// let mut sketch = QuantileSketch::new(200);
/// for v in 1..=5 {
///     sketch.update(v as f64);
/// }
/// assert_eq!(sketch.quantile(0.5), Some(3.0));
/// assert_eq!(sketch.rank(2.0), 2.0);
/// ```
#[derive(Debug, Clone)]
pub struct QuantileSketch {
    k: usize,
    compactors: Vec<Compactor>,
    n: u64,
    min: f64,
    max: f64,
}

impl QuantileSketch {
    /// Creates an empty sketch. `k` is raised to the minimum level capacity
    /// when smaller.
    pub fn new(k: usize) -> Self {
        let k = k.max(MIN_LEVEL_CAPACITY);
        Self {
            k,
            compactors: vec![Compactor::new(k)],
            n: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn level_capacity(&self, level: usize) -> usize {
        // Capacities shrink by a factor of 2/3 per level.
        let scaled = self.k as f64 * (2.0f64 / 3.0).powi(level as i32);
        (scaled as usize).max(MIN_LEVEL_CAPACITY)
    }

    /// Adds a value. NaN is ignored.
    pub fn update(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.n += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.compactors[0].push(value);
        self.compress();
    }

    fn compress(&mut self) {
        let mut level = 0;
        while level < self.compactors.len() {
            while self.compactors[level].is_full() {
                if level + 1 == self.compactors.len() {
                    let capacity = self.level_capacity(level + 1);
                    self.compactors.push(Compactor::new(capacity));
                }
                let promoted = self.compactors[level].compact();
                self.compactors[level + 1].extend(&promoted);
            }
            level += 1;
        }
    }

    /// Folds another sketch into this one. Both must share the same `k`.
    pub fn merge(&mut self, other: &QuantileSketch) -> Result<()> {
        if self.k != other.k {
            return Err(TermError::Statistics(format!(
                "Cannot merge quantile sketches with different sizes: {} vs {}",
                self.k, other.k
            )));
        }
        if other.is_empty() {
            return Ok(());
        }

        self.n += other.n;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);

        for (level, compactor) in other.compactors.iter().enumerate() {
            while level >= self.compactors.len() {
                let capacity = self.level_capacity(self.compactors.len());
                self.compactors.push(Compactor::new(capacity));
            }
            self.compactors[level].extend(&compactor.items);
        }
        self.compress();
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn min(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.max)
    }

    /// Whether no compaction has happened yet, i.e. answers are exact.
    pub fn is_exact(&self) -> bool {
        self.compactors.len() == 1
    }

    /// All retained items with their weights, sorted by value.
    fn weighted_items(&self) -> Vec<(f64, u64)> {
        let mut items: Vec<(f64, u64)> = self
            .compactors
            .iter()
            .enumerate()
            .flat_map(|(level, compactor)| {
                let weight = 1u64 << level.min(62);
                compactor.items.iter().map(move |&v| (v, weight))
            })
            .collect();
        items.sort_by(|a, b| cmp_f64(&a.0, &b.0));
        items
    }

    /// Value at quantile `phi` in `[0, 1]`, `None` when empty or `phi` is out
    /// of range.
    pub fn quantile(&self, phi: f64) -> Option<f64> {
        self.quantiles(&[phi]).into_iter().next().flatten()
    }

    /// Values at several quantiles, computed from a single sorted pass.
    pub fn quantiles(&self, phis: &[f64]) -> Vec<Option<f64>> {
        if self.is_empty() {
            return vec![None; phis.len()];
        }
        let items = self.weighted_items();
        let total: u64 = items.iter().map(|(_, w)| *w).sum();

        phis.iter()
            .map(|&phi| {
                if !(0.0..=1.0).contains(&phi) {
                    return None;
                }
                if phi == 0.0 {
                    return Some(self.min);
                }
                if phi == 1.0 {
                    return Some(self.max);
                }
                let target = (phi * total as f64).ceil() as u64;
                let mut cumulative = 0u64;
                for &(value, weight) in &items {
                    cumulative += weight;
                    if cumulative >= target {
                        return Some(value);
                    }
                }
                Some(self.max)
            })
            .collect()
    }

    /// Estimated number of values less than or equal to `value`.
    pub fn rank(&self, value: f64) -> f64 {
        self.weighted_count(|v| v <= value)
    }

    /// Estimated number of values strictly less than `value`.
    pub fn rank_exclusive(&self, value: f64) -> f64 {
        self.weighted_count(|v| v < value)
    }

    fn weighted_count(&self, include: impl Fn(f64) -> bool) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let (selected, total) = self
            .compactors
            .iter()
            .enumerate()
            .fold((0u64, 0u64), |(selected, total), (level, compactor)| {
                let weight = 1u64 << level.min(62);
                let hits = compactor.items.iter().filter(|&&v| include(v)).count() as u64;
                (
                    selected + hits * weight,
                    total + compactor.items.len() as u64 * weight,
                )
            });
        if total == 0 {
            return 0.0;
        }
        // Retained weights drift from n after compaction; rescale to n.
        selected as f64 * self.n as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_small_stream() {
        let mut sketch = QuantileSketch::new(200);
        for v in [5.0, 1.0, 4.0, 2.0, 3.0] {
            sketch.update(v);
        }
        assert!(sketch.is_exact());
        assert_eq!(sketch.count(), 5);
        assert_eq!(sketch.min(), Some(1.0));
        assert_eq!(sketch.max(), Some(5.0));
        assert_eq!(sketch.quantile(0.5), Some(3.0));
        assert_eq!(sketch.quantile(0.0), Some(1.0));
        assert_eq!(sketch.quantile(1.0), Some(5.0));
        assert_eq!(sketch.quantile(1.5), None);
        assert_eq!(sketch.rank(3.0), 3.0);
        assert_eq!(sketch.rank_exclusive(3.0), 2.0);
    }

    #[test]
    fn test_empty_sketch() {
        let sketch = QuantileSketch::new(50);
        assert!(sketch.is_empty());
        assert_eq!(sketch.quantile(0.5), None);
        assert_eq!(sketch.min(), None);
        assert_eq!(sketch.rank(1.0), 0.0);
    }

    #[test]
    fn test_nan_is_ignored() {
        let mut sketch = QuantileSketch::new(50);
        sketch.update(f64::NAN);
        sketch.update(1.0);
        assert_eq!(sketch.count(), 1);
    }

    #[test]
    fn test_large_stream_accuracy() {
        let mut sketch = QuantileSketch::new(200);
        for i in 0..10_000 {
            sketch.update(i as f64);
        }
        assert!(!sketch.is_exact());
        assert_eq!(sketch.count(), 10_000);

        let median = sketch.quantile(0.5).unwrap();
        assert!((median - 5_000.0).abs() < 1_000.0, "median was {median}");

        let rank = sketch.rank(2_500.0);
        assert!((rank - 2_500.0).abs() < 1_000.0, "rank was {rank}");
        assert_eq!(sketch.rank(f64::MAX), 10_000.0);
    }

    #[test]
    fn test_merge() {
        let mut left = QuantileSketch::new(200);
        let mut right = QuantileSketch::new(200);
        for i in 0..50 {
            left.update(i as f64);
            right.update((i + 50) as f64);
        }
        left.merge(&right).unwrap();
        assert_eq!(left.count(), 100);
        assert_eq!(left.min(), Some(0.0));
        assert_eq!(left.max(), Some(99.0));
        assert_eq!(left.quantile(0.5), Some(49.0));

        let other = QuantileSketch::new(100);
        assert!(left.merge(&other).is_err());
    }

    #[test]
    fn test_merge_empty_is_noop() {
        let mut sketch = QuantileSketch::new(20);
        sketch.update(1.0);
        sketch.merge(&QuantileSketch::new(20)).unwrap();
        assert_eq!(sketch.count(), 1);
        assert_eq!(sketch.min(), Some(1.0));
    }
}
