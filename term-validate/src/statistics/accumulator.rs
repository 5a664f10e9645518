//! Mergeable partial statistics for features and slices.

use super::quantiles::QuantileSketch;
use super::{
    Bucket, CommonStatistics, DatasetFeatureStatistics, FeatureNameStatistics, FeatureStats,
    FreqAndValue, Histogram, HistogramType, NumericStatistics, StringStatistics,
};
use crate::decode::{Example, FeatureValues};
use crate::error::{Result, TermError};
use crate::options::StatsOptions;
use crate::schema::FeatureType;
use std::collections::BTreeMap;

/// Running moments, counts and a quantile sketch of numeric values.
#[derive(Debug, Clone)]
pub struct NumericAccumulator {
    /// Finite values seen.
    count: u64,
    mean: f64,
    /// Sum of squared deviations from the running mean.
    m2: f64,
    num_zeros: u64,
    num_nan: u64,
    num_infinite: u64,
    sketch: QuantileSketch,
}

impl NumericAccumulator {
    pub fn new(sketch_size: usize) -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            num_zeros: 0,
            num_nan: 0,
            num_infinite: 0,
            sketch: QuantileSketch::new(sketch_size),
        }
    }

    pub fn add(&mut self, value: f64) {
        if value.is_nan() {
            self.num_nan += 1;
            return;
        }
        if value.is_infinite() {
            self.num_infinite += 1;
            return;
        }
        self.count += 1;
        let n = self.count as f64;
        let previous = self.mean;
        // Scaled before subtracting so values near f64::MAX cannot overflow.
        self.mean = finite_or(previous + (value / n - previous / n), previous);
        self.m2 += (value - previous) * (value - self.mean);
        if value == 0.0 {
            self.num_zeros += 1;
        }
        self.sketch.update(value);
    }

    pub fn merge(&mut self, other: &NumericAccumulator) -> Result<()> {
        if self.count == 0 {
            self.mean = other.mean;
            self.m2 = other.m2;
        } else if other.count > 0 {
            let n = (self.count + other.count) as f64;
            let left = self.count as f64 / n;
            let right = other.count as f64 / n;
            let delta = other.mean - self.mean;
            let mean = self.mean * left + other.mean * right;
            self.m2 += other.m2 + delta * delta * left * other.count as f64;
            self.mean = finite_or(mean, self.mean);
        }
        self.count += other.count;
        self.num_zeros += other.num_zeros;
        self.num_nan += other.num_nan;
        self.num_infinite += other.num_infinite;
        self.sketch.merge(&other.sketch)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn num_nan(&self) -> u64 {
        self.num_nan
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation.
    ///
    /// Saturates at `f64::MAX` when the squared deviations exceed the `f64`
    /// range.
    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let variance = (self.m2 / self.count as f64).max(0.0);
        finite_or(variance.sqrt(), f64::MAX)
    }

    fn standard_histogram(&self, num_buckets: usize) -> Histogram {
        let mut buckets = Vec::new();
        if let (Some(min), Some(max)) = (self.sketch.min(), self.sketch.max()) {
            let width = (max - min) / num_buckets as f64;
            if min == max || num_buckets == 1 || !width.is_finite() {
                buckets.push(Bucket {
                    low_value: min,
                    high_value: max,
                    sample_count: self.count as f64,
                });
            } else {
                let mut below = 0.0;
                for i in 0..num_buckets {
                    let last = i + 1 == num_buckets;
                    let low_value = min + width * i as f64;
                    let high_value = if last { max } else { min + width * (i + 1) as f64 };
                    let cumulative = if last {
                        self.count as f64
                    } else {
                        self.sketch.rank_exclusive(high_value)
                    };
                    buckets.push(Bucket {
                        low_value,
                        high_value,
                        sample_count: cumulative - below,
                    });
                    below = cumulative;
                }
            }
        }
        Histogram {
            histogram_type: HistogramType::Standard,
            num_nan: self.num_nan,
            num_undefined: self.num_infinite,
            buckets,
        }
    }

    pub fn finish(&self, common: CommonStatistics, options: &StatsOptions) -> NumericStatistics {
        NumericStatistics {
            common,
            mean: self.mean(),
            std_dev: self.std_dev(),
            num_zeros: self.num_zeros,
            min: self.sketch.min().unwrap_or(0.0),
            median: self.sketch.quantile(0.5).unwrap_or(0.0),
            max: self.sketch.max().unwrap_or(0.0),
            num_nan: self.num_nan,
            histograms: vec![
                self.standard_histogram(options.num_histogram_buckets),
                quantiles_histogram(
                    &self.sketch,
                    options.num_quantiles_histogram_buckets,
                    self.num_nan,
                    self.num_infinite,
                ),
            ],
        }
    }
}

/// Replaces NaN and infinities, which JSON cannot represent.
fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Buckets bounded by the `i / num_buckets` quantiles, each holding an equal
/// share of the values.
fn quantiles_histogram(
    sketch: &QuantileSketch,
    num_buckets: usize,
    num_nan: u64,
    num_undefined: u64,
) -> Histogram {
    let mut buckets = Vec::with_capacity(num_buckets);
    if !sketch.is_empty() && num_buckets > 0 {
        let phis: Vec<f64> = (0..=num_buckets)
            .map(|i| i as f64 / num_buckets as f64)
            .collect();
        let bounds = sketch.quantiles(&phis);
        let sample_count = sketch.count() as f64 / num_buckets as f64;
        for pair in bounds.windows(2) {
            if let [Some(low_value), Some(high_value)] = pair {
                buckets.push(Bucket {
                    low_value: *low_value,
                    high_value: *high_value,
                    sample_count,
                });
            }
        }
    }
    Histogram {
        histogram_type: HistogramType::Quantiles,
        num_nan,
        num_undefined,
        buckets,
    }
}

/// Exact value frequencies and lengths of string values.
#[derive(Debug, Clone, Default)]
pub struct StringAccumulator {
    counts: BTreeMap<String, u64>,
    num_values: u64,
    total_length: u64,
}

impl StringAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: &str) {
        self.num_values += 1;
        self.total_length += value.len() as u64;
        match self.counts.get_mut(value) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(value.to_string(), 1);
            }
        }
    }

    pub fn merge(&mut self, other: &StringAccumulator) {
        self.num_values += other.num_values;
        self.total_length += other.total_length;
        for (value, count) in &other.counts {
            *self.counts.entry(value.clone()).or_insert(0) += count;
        }
    }

    /// The `n` most frequent values, ties broken by value.
    pub fn top_values(&self, n: usize) -> Vec<FreqAndValue> {
        let mut entries: Vec<(&String, &u64)> = self.counts.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        entries
            .into_iter()
            .take(n)
            .map(|(value, frequency)| FreqAndValue {
                value: value.clone(),
                frequency: *frequency,
            })
            .collect()
    }

    pub fn finish(&self, common: CommonStatistics, options: &StatsOptions) -> StringStatistics {
        StringStatistics {
            common,
            unique: self.counts.len() as u64,
            top_values: self.top_values(options.num_top_values),
            avg_length: if self.num_values == 0 {
                0.0
            } else {
                self.total_length as f64 / self.num_values as f64
            },
        }
    }
}

#[derive(Debug, Clone)]
enum ValueAccumulator {
    Numeric(NumericAccumulator),
    String(StringAccumulator),
}

/// Partial statistics of one feature within one slice.
#[derive(Debug, Clone)]
pub struct FeatureAccumulator {
    feature_type: FeatureType,
    num_non_missing: u64,
    tot_num_values: u64,
    min_num_values: u64,
    max_num_values: u64,
    num_values: QuantileSketch,
    values: ValueAccumulator,
}

impl FeatureAccumulator {
    pub fn new(feature_type: FeatureType, sketch_size: usize) -> Self {
        let values = match feature_type {
            FeatureType::Int | FeatureType::Float => {
                ValueAccumulator::Numeric(NumericAccumulator::new(sketch_size))
            }
            FeatureType::String => ValueAccumulator::String(StringAccumulator::new()),
        };
        Self {
            feature_type,
            num_non_missing: 0,
            tot_num_values: 0,
            min_num_values: u64::MAX,
            max_num_values: 0,
            num_values: QuantileSketch::new(sketch_size),
            values,
        }
    }

    /// Type after widening int to float on conflicts.
    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    pub fn num_non_missing(&self) -> u64 {
        self.num_non_missing
    }

    pub fn tot_num_values(&self) -> u64 {
        self.tot_num_values
    }

    fn widen(&mut self, name: &str, incoming: FeatureType) -> Result<()> {
        match (self.feature_type, incoming) {
            (current, incoming) if current == incoming => Ok(()),
            (FeatureType::Float, FeatureType::Int) => Ok(()),
            (FeatureType::Int, FeatureType::Float) => {
                self.feature_type = FeatureType::Float;
                Ok(())
            }
            (current, incoming) => Err(TermError::Statistics(format!(
                "Feature '{name}' has conflicting types: {current} and {incoming}"
            ))),
        }
    }

    /// Adds the values one example carries for this feature.
    pub fn add(&mut self, name: &str, values: &FeatureValues) -> Result<()> {
        self.widen(name, values.feature_type())?;

        let n = values.len() as u64;
        self.num_non_missing += 1;
        self.tot_num_values += n;
        self.min_num_values = self.min_num_values.min(n);
        self.max_num_values = self.max_num_values.max(n);
        self.num_values.update(n as f64);

        match (&mut self.values, values) {
            (ValueAccumulator::Numeric(acc), FeatureValues::Int(v)) => {
                v.iter().for_each(|&x| acc.add(x as f64))
            }
            (ValueAccumulator::Numeric(acc), FeatureValues::Float(v)) => {
                v.iter().for_each(|&x| acc.add(x))
            }
            (ValueAccumulator::String(acc), FeatureValues::String(v)) => {
                v.iter().for_each(|x| acc.add(x))
            }
            _ => {
                return Err(TermError::Internal(format!(
                    "Accumulator for feature '{name}' does not accept {} values",
                    values.feature_type()
                )))
            }
        }
        Ok(())
    }

    pub fn merge(&mut self, name: &str, other: &FeatureAccumulator) -> Result<()> {
        self.widen(name, other.feature_type)?;

        self.num_non_missing += other.num_non_missing;
        self.tot_num_values += other.tot_num_values;
        self.min_num_values = self.min_num_values.min(other.min_num_values);
        self.max_num_values = self.max_num_values.max(other.max_num_values);
        self.num_values.merge(&other.num_values)?;

        match (&mut self.values, &other.values) {
            (ValueAccumulator::Numeric(acc), ValueAccumulator::Numeric(o)) => acc.merge(o),
            (ValueAccumulator::String(acc), ValueAccumulator::String(o)) => {
                acc.merge(o);
                Ok(())
            }
            _ => Err(TermError::Internal(format!(
                "Cannot merge accumulators of feature '{name}' holding different kinds of values"
            ))),
        }
    }

    fn common(&self, num_examples: u64, options: &StatsOptions) -> CommonStatistics {
        let present = self.num_non_missing > 0;
        CommonStatistics {
            num_non_missing: self.num_non_missing,
            num_missing: num_examples.saturating_sub(self.num_non_missing),
            min_num_values: if present { self.min_num_values } else { 0 },
            max_num_values: self.max_num_values,
            avg_num_values: if present {
                self.tot_num_values as f64 / self.num_non_missing as f64
            } else {
                0.0
            },
            tot_num_values: self.tot_num_values,
            num_values_histogram: present.then(|| {
                quantiles_histogram(
                    &self.num_values,
                    options.num_values_histogram_buckets,
                    0,
                    0,
                )
            }),
        }
    }

    /// Final statistics of this feature for a slice of `num_examples` examples.
    pub fn finish(
        &self,
        name: &str,
        num_examples: u64,
        options: &StatsOptions,
    ) -> FeatureNameStatistics {
        let common = self.common(num_examples, options);
        let stats = match &self.values {
            ValueAccumulator::Numeric(acc) => FeatureStats::Numeric(acc.finish(common, options)),
            ValueAccumulator::String(acc) => FeatureStats::String(acc.finish(common, options)),
        };
        FeatureNameStatistics {
            name: name.to_string(),
            feature_type: self.feature_type,
            stats,
        }
    }
}

/// Partial statistics of one slice.
#[derive(Debug, Clone, Default)]
pub struct SliceAccumulator {
    num_examples: u64,
    features: BTreeMap<String, FeatureAccumulator>,
}

impl SliceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_examples(&self) -> u64 {
        self.num_examples
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureAccumulator> {
        self.features.get(name)
    }

    pub fn add_example(&mut self, example: &Example, options: &StatsOptions) -> Result<()> {
        self.num_examples += 1;
        for (name, values) in example.features() {
            if !options.is_feature_allowed(name) {
                continue;
            }
            match self.features.get_mut(name) {
                Some(acc) => acc.add(name, values)?,
                None => {
                    let mut acc = FeatureAccumulator::new(values.feature_type(), options.sketch_size);
                    acc.add(name, values)?;
                    self.features.insert(name.to_string(), acc);
                }
            }
        }
        Ok(())
    }

    pub fn merge(&mut self, other: SliceAccumulator) -> Result<()> {
        self.num_examples += other.num_examples;
        for (name, acc) in other.features {
            match self.features.get_mut(&name) {
                Some(existing) => existing.merge(&name, &acc)?,
                None => {
                    self.features.insert(name, acc);
                }
            }
        }
        Ok(())
    }

    pub fn finish(&self, slice_name: &str, options: &StatsOptions) -> DatasetFeatureStatistics {
        DatasetFeatureStatistics {
            name: slice_name.to_string(),
            num_examples: self.num_examples,
            features: self
                .features
                .iter()
                .map(|(name, acc)| acc.finish(name, self.num_examples, options))
                .collect(),
        }
    }
}
