//! Statistics sliced by anomaly reason.

use super::accumulator::SliceAccumulator;
use super::{DatasetFeatureStatisticsList, StatisticsAggregator, ALL_EXAMPLES_SLICE};
use crate::anomalies::TaggedExample;
use crate::error::Result;
use crate::options::StatsOptions;
use std::collections::{BTreeMap, BTreeSet};

/// Computes statistics for `All Examples` and for one slice per distinct
/// anomaly reason.
///
/// An example with several reasons lands in several slices; an example
/// without reasons only counts towards `All Examples`.
///
/// ```rust
/// use term_validate::anomalies::{AnomalyKind, AnomalyReason, TaggedExample};
/// use term_validate::decode::Example;
/// use term_validate::options::StatsOptions;
/// use term_validate::statistics::{SlicedStatisticsGenerator, StatisticsAggregator};
///
/// let generator = SlicedStatisticsGenerator::new(StatsOptions::default());
/// let mut acc = generator.create_accumulator();
/// generator
///     .add_example(&mut acc, &TaggedExample::new(Example::new().with_feature("x", 1i64), vec![]))
///     .unwrap();
/// generator
///     .add_example(
///         &mut acc,
///         &TaggedExample::new(
///             Example::new(),
///             vec![AnomalyReason::new("x", AnomalyKind::SchemaMissingColumn)],
///         ),
///     )
///     .unwrap();
///
/// let stats = generator.extract_output(acc).unwrap();
/// assert_eq!(stats.slice_names(), vec!["All Examples", "x_SCHEMA_MISSING_COLUMN"]);
/// ```
#[derive(Debug, Clone)]
pub struct SlicedStatisticsGenerator {
    options: StatsOptions,
}

impl SlicedStatisticsGenerator {
    pub fn new(options: StatsOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &StatsOptions {
        &self.options
    }
}

/// Per-slice accumulators of one partition.
#[derive(Debug, Default)]
pub struct SlicedAccumulator {
    global: SliceAccumulator,
    slices: BTreeMap<String, SliceAccumulator>,
}

impl SlicedAccumulator {
    /// Examples accumulated so far.
    pub fn num_examples(&self) -> u64 {
        self.global.num_examples()
    }

    /// Number of anomaly slices, not counting `All Examples`.
    pub fn num_slices(&self) -> usize {
        self.slices.len()
    }

    fn merge(&mut self, other: SlicedAccumulator) -> Result<()> {
        self.global.merge(other.global)?;
        for (key, slice) in other.slices {
            match self.slices.get_mut(&key) {
                Some(existing) => existing.merge(slice)?,
                None => {
                    self.slices.insert(key, slice);
                }
            }
        }
        Ok(())
    }
}

impl StatisticsAggregator for SlicedStatisticsGenerator {
    type Accumulator = SlicedAccumulator;

    fn create_accumulator(&self) -> SlicedAccumulator {
        SlicedAccumulator::default()
    }

    fn add_example(&self, accumulator: &mut SlicedAccumulator, example: &TaggedExample) -> Result<()> {
        accumulator
            .global
            .add_example(&example.example, &self.options)?;

        let keys: BTreeSet<String> = example.reasons.iter().map(|r| r.slice_key()).collect();
        for key in keys {
            accumulator
                .slices
                .entry(key)
                .or_default()
                .add_example(&example.example, &self.options)?;
        }
        Ok(())
    }

    fn merge_accumulators(&self, accumulators: Vec<SlicedAccumulator>) -> Result<SlicedAccumulator> {
        let mut merged = SlicedAccumulator::default();
        for accumulator in accumulators {
            merged.merge(accumulator)?;
        }
        Ok(merged)
    }

    fn extract_output(&self, accumulator: SlicedAccumulator) -> Result<DatasetFeatureStatisticsList> {
        let mut datasets = Vec::with_capacity(accumulator.slices.len() + 1);
        datasets.push(accumulator.global.finish(ALL_EXAMPLES_SLICE, &self.options));
        datasets.extend(
            accumulator
                .slices
                .iter()
                .map(|(key, slice)| slice.finish(key, &self.options)),
        );
        Ok(DatasetFeatureStatisticsList::new(datasets))
    }
}
