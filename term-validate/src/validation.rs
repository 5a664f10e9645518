//! Entry points that validate records against a schema and collect sliced
//! statistics of the anomalous ones.
//!
//! [`validate_examples_in_files`] is the convenience call most users want. It
//! checks the options, resolves the output location, runs the five-stage
//! [`Pipeline`] and returns the summary reloaded from disk. The returned value
//! is therefore always identical to what [`load_statistics`] reads back from
//! the output path.
//!
//! [`load_statistics`]: crate::store::load_statistics

use crate::anomalies::SchemaAnomalyDetector;
use crate::error::{ErrorContext, Result};
use crate::logging::LogConfig;
use crate::options::{ExecutionOptions, StatsOptions};
use crate::pipeline::{Pipeline, PipelineRun};
use crate::sources::{FileRecordSource, RecordSource};
use crate::statistics::{DatasetFeatureStatisticsList, SlicedStatisticsGenerator};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// File name of the statistics written into a fresh temporary directory.
pub const DEFAULT_OUTPUT_FILE: &str = "anomaly_stats";

/// Prefix of temporary output directories.
const TEMP_DIR_PREFIX: &str = "term-validate-";

/// Validates records and generates statistics of the anomalous ones.
///
/// # Examples
///
/// ```rust,no_run
/// use term_validate::prelude::*;
///
/// # async fn example() -> term_validate::error::Result<()> {
/// let schema = Schema::builder()
///     .feature(FeatureSpec::int("age").required().int_domain(Some(0), Some(150)))
///     .feature(FeatureSpec::string("country").string_domain(["FR", "DE", "US"]))
///     .build();
///
/// let (stats, run) = ValidateRecordsPipeline::new(
///     "data/people-*.jsonl",
///     StatsOptions::builder().schema(schema).build(),
/// )
/// .with_output_path("out/anomaly_stats")
/// .with_execution_options(ExecutionOptions::new().with_target_partitions(4))
/// .run_with_report()
/// .await?;
///
/// for slice in stats.anomaly_slices() {
///     println!("{}: {} examples", slice.name, slice.num_examples);
/// }
/// println!("{} of {} examples are anomalous", run.num_anomalous_examples, run.num_examples);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ValidateRecordsPipeline {
    source: Arc<dyn RecordSource>,
    stats_options: StatsOptions,
    output_path: Option<PathBuf>,
    execution_options: ExecutionOptions,
    log_config: LogConfig,
}

impl ValidateRecordsPipeline {
    /// Reads the files matched by `data_location`, a glob pattern.
    pub fn new(data_location: &str, stats_options: StatsOptions) -> Self {
        Self::from_source(FileRecordSource::new(data_location), stats_options)
    }

    /// Reads records from any [`RecordSource`].
    pub fn from_source(source: impl RecordSource + 'static, stats_options: StatsOptions) -> Self {
        Self {
            source: Arc::new(source),
            stats_options,
            output_path: None,
            execution_options: ExecutionOptions::default(),
            log_config: LogConfig::default(),
        }
    }

    /// Writes the statistics to `path` instead of a fresh temporary directory.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_execution_options(mut self, options: ExecutionOptions) -> Self {
        self.execution_options = options;
        self
    }

    pub fn with_log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    /// Runs the pipeline and returns the reloaded statistics.
    pub async fn run(&self) -> Result<DatasetFeatureStatisticsList> {
        self.run_with_report().await.map(|(stats, _)| stats)
    }

    /// Runs the pipeline and returns the reloaded statistics together with the
    /// run counters.
    #[instrument(skip(self), fields(source = %self.source.description()))]
    pub async fn run_with_report(&self) -> Result<(DatasetFeatureStatisticsList, PipelineRun)> {
        // Configuration problems surface before anything touches the filesystem.
        let schema = Arc::clone(self.stats_options.require_schema()?);
        self.stats_options.validate()?;
        let ctx = self.execution_options.session_context()?;

        let output_path = resolve_output_path(self.output_path.as_deref())?;
        ensure_parent_dir(&output_path)?;
        info!(output = %output_path.display(), "Resolved statistics output path");

        let pipeline = Pipeline::builder()
            .shared_source(Arc::clone(&self.source))
            .detector(SchemaAnomalyDetector::new(schema))
            .aggregator(SlicedStatisticsGenerator::new(self.stats_options.clone()))
            .output_path(&output_path)
            .log_config(self.log_config.clone())
            .build()?;

        let run = pipeline.run(&ctx).await?;
        let statistics = pipeline.store().load(&output_path).await?;
        Ok((statistics, run))
    }
}

/// Validates the examples in the files matched by `data_location` against the
/// schema in `stats_options` and writes statistics sliced by anomaly reason.
///
/// Without an `output_path` the statistics go to `anomaly_stats` inside a new
/// temporary directory that is left in place. Fails with a configuration error,
/// before creating any directory, when `stats_options` has no schema.
pub async fn validate_examples_in_files(
    data_location: &str,
    stats_options: &StatsOptions,
    output_path: Option<&Path>,
    execution_options: Option<ExecutionOptions>,
) -> Result<DatasetFeatureStatisticsList> {
    validate_examples(
        FileRecordSource::new(data_location),
        stats_options,
        output_path,
        execution_options,
    )
    .await
}

/// Same as [`validate_examples_in_files`] for records from any source.
pub async fn validate_examples(
    source: impl RecordSource + 'static,
    stats_options: &StatsOptions,
    output_path: Option<&Path>,
    execution_options: Option<ExecutionOptions>,
) -> Result<DatasetFeatureStatisticsList> {
    let mut pipeline = ValidateRecordsPipeline::from_source(source, stats_options.clone())
        .with_execution_options(execution_options.unwrap_or_default());
    if let Some(path) = output_path {
        pipeline = pipeline.with_output_path(path);
    }
    pipeline.run().await
}

/// Blocking variant of [`validate_examples_in_files`].
///
/// Builds a multi-threaded Tokio runtime for the duration of the call, so it
/// must not be called from within an async context.
pub fn validate_examples_in_files_blocking(
    data_location: &str,
    stats_options: &StatsOptions,
    output_path: Option<&Path>,
    execution_options: Option<ExecutionOptions>,
) -> Result<DatasetFeatureStatisticsList> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(validate_examples_in_files(
        data_location,
        stats_options,
        output_path,
        execution_options,
    ))
}

/// Returns `output_path`, or `anomaly_stats` inside a newly created temporary
/// directory that outlives the call.
pub fn resolve_output_path(output_path: Option<&Path>) -> Result<PathBuf> {
    match output_path {
        Some(path) => Ok(path.to_path_buf()),
        None => {
            let dir = tempfile::Builder::new()
                .prefix(TEMP_DIR_PREFIX)
                .tempdir()
                .context("Failed to create a temporary output directory")?
                .keep();
            debug!(dir = %dir.display(), "Created temporary output directory");
            Ok(dir.join(DEFAULT_OUTPUT_FILE))
        }
    }
}

/// Creates the parent directory of `path` if it does not exist yet.
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
    }
    Ok(())
}
