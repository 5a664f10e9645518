//! Prelude for commonly used types and traits in term-validate.

pub use crate::anomalies::{AnomalyDetector, AnomalyKind, AnomalyReason, SchemaAnomalyDetector};
pub use crate::decode::{Example, FeatureValues, RecordDecoder};
pub use crate::error::{ErrorContext, Result, TermError};
pub use crate::formatters::{FormatterConfig, StatisticsFormatter};
pub use crate::logging::LogConfig;
pub use crate::options::{ExecutionOptions, StatsOptions};
pub use crate::schema::{FeatureSpec, FeatureType, Schema};
pub use crate::sources::{FileRecordSource, MemoryRecordSource, RecordSource};
pub use crate::statistics::{DatasetFeatureStatisticsList, StatisticsAggregator, ALL_EXAMPLES_SLICE};
pub use crate::store::load_statistics;
pub use crate::validation::{validate_examples_in_files, ValidateRecordsPipeline};
