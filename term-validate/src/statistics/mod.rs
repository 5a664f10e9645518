//! Sliced summary statistics over tagged examples.
//!
//! The statistics summary is a [`DatasetFeatureStatisticsList`]: one
//! [`DatasetFeatureStatistics`] per slice, the global `All Examples` slice
//! first and one slice per anomaly reason after it. Aggregation follows a
//! combine pattern so that partitions can be accumulated independently and
//! merged afterwards:
//!
//! ```text
//! create_accumulator -> add_example* -> merge_accumulators -> extract_output
//! ```

pub mod accumulator;
pub mod quantiles;
pub mod sliced;

pub use accumulator::{FeatureAccumulator, NumericAccumulator, SliceAccumulator, StringAccumulator};
pub use quantiles::QuantileSketch;
pub use sliced::{SlicedAccumulator, SlicedStatisticsGenerator};

use crate::anomalies::TaggedExample;
use crate::error::Result;
use crate::schema::FeatureType;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Name of the slice that covers every example.
pub const ALL_EXAMPLES_SLICE: &str = "All Examples";

/// Combine-style aggregation of tagged examples into a statistics summary.
///
/// Accumulators must merge associatively: accumulating a stream split into
/// parts and merging the parts yields the same counts as accumulating the
/// whole stream.
pub trait StatisticsAggregator: Debug + Send + Sync + 'static {
    type Accumulator: Debug + Send + 'static;

    fn create_accumulator(&self) -> Self::Accumulator;

    fn add_example(&self, accumulator: &mut Self::Accumulator, example: &TaggedExample)
        -> Result<()>;

    fn merge_accumulators(&self, accumulators: Vec<Self::Accumulator>)
        -> Result<Self::Accumulator>;

    fn extract_output(&self, accumulator: Self::Accumulator) -> Result<DatasetFeatureStatisticsList>;
}

/// Statistics for every slice of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetFeatureStatisticsList {
    pub datasets: Vec<DatasetFeatureStatistics>,
}

impl DatasetFeatureStatisticsList {
    pub fn new(datasets: Vec<DatasetFeatureStatistics>) -> Self {
        Self { datasets }
    }

    /// Looks up a slice by name.
    pub fn slice(&self, name: &str) -> Option<&DatasetFeatureStatistics> {
        self.datasets.iter().find(|d| d.name == name)
    }

    /// The `All Examples` slice.
    pub fn global(&self) -> Option<&DatasetFeatureStatistics> {
        self.slice(ALL_EXAMPLES_SLICE)
    }

    pub fn slice_names(&self) -> Vec<&str> {
        self.datasets.iter().map(|d| d.name.as_str()).collect()
    }

    /// Slices other than `All Examples`, i.e. one per anomaly reason.
    pub fn anomaly_slices(&self) -> impl Iterator<Item = &DatasetFeatureStatistics> {
        self.datasets.iter().filter(|d| d.name != ALL_EXAMPLES_SLICE)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// Statistics of one slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFeatureStatistics {
    pub name: String,
    pub num_examples: u64,
    /// Sorted by feature name.
    pub features: Vec<FeatureNameStatistics>,
}

impl DatasetFeatureStatistics {
    pub fn feature(&self, name: &str) -> Option<&FeatureNameStatistics> {
        self.features.iter().find(|f| f.name == name)
    }
}

/// Statistics of one feature within a slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureNameStatistics {
    pub name: String,
    #[serde(rename = "type")]
    pub feature_type: FeatureType,
    pub stats: FeatureStats,
}

impl FeatureNameStatistics {
    pub fn common(&self) -> &CommonStatistics {
        match &self.stats {
            FeatureStats::Numeric(stats) => &stats.common,
            FeatureStats::String(stats) => &stats.common,
        }
    }

    pub fn numeric(&self) -> Option<&NumericStatistics> {
        match &self.stats {
            FeatureStats::Numeric(stats) => Some(stats),
            FeatureStats::String(_) => None,
        }
    }

    pub fn string(&self) -> Option<&StringStatistics> {
        match &self.stats {
            FeatureStats::String(stats) => Some(stats),
            FeatureStats::Numeric(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureStats {
    Numeric(NumericStatistics),
    String(StringStatistics),
}

/// Statistics shared by every feature type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonStatistics {
    /// Examples in which the feature is present.
    pub num_non_missing: u64,
    /// Examples of the slice in which the feature is absent.
    pub num_missing: u64,
    pub min_num_values: u64,
    pub max_num_values: u64,
    pub avg_num_values: f64,
    pub tot_num_values: u64,
    /// Quantiles histogram of the number of values per example.
    pub num_values_histogram: Option<Histogram>,
}

/// Statistics of int and float features.
///
/// Moments, extremes and histograms only cover finite values; NaN values are
/// counted in `num_nan` and infinite values in the histograms' `num_undefined`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericStatistics {
    pub common: CommonStatistics,
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    pub num_zeros: u64,
    pub min: f64,
    pub median: f64,
    pub max: f64,
    pub num_nan: u64,
    /// A standard histogram followed by a quantiles histogram.
    pub histograms: Vec<Histogram>,
}

impl NumericStatistics {
    pub fn histogram(&self, histogram_type: HistogramType) -> Option<&Histogram> {
        self.histograms
            .iter()
            .find(|h| h.histogram_type == histogram_type)
    }
}

/// Statistics of string features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StringStatistics {
    pub common: CommonStatistics,
    /// Number of distinct values.
    pub unique: u64,
    /// Most frequent values, by frequency then value.
    pub top_values: Vec<FreqAndValue>,
    /// Average value length in bytes.
    pub avg_length: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreqAndValue {
    pub value: String,
    pub frequency: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistogramType {
    /// Equal-width buckets between the minimum and maximum.
    Standard,
    /// Buckets holding an equal share of the values.
    Quantiles,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    #[serde(rename = "type")]
    pub histogram_type: HistogramType,
    pub num_nan: u64,
    pub num_undefined: u64,
    pub buckets: Vec<Bucket>,
}

impl Histogram {
    /// Sum of the bucket sample counts.
    pub fn total_count(&self) -> f64 {
        self.buckets.iter().map(|b| b.sample_count).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub low_value: f64,
    pub high_value: f64,
    pub sample_count: f64,
}
