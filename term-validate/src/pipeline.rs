//! The five-stage validation pipeline.
//!
//! ```text
//! ReadData -> DecodeData -> DetectAnomalies -> GenerateSummaryStatistics -> WriteStatsOutput
//! ```
//!
//! The source is planned once and executed as one stream per DataFusion
//! partition. Each partition is decoded, checked and accumulated in its own
//! Tokio task, with the per-batch work on the blocking pool. A failing
//! partition aborts the others. The partition accumulators are merged in
//! partition order, the summary is extracted and finally written by the
//! store.

use crate::anomalies::{AnomalyDetector, TaggedExample};
use crate::decode::{ArrowExampleDecoder, RecordDecoder};
use crate::error::{Result, TermError};
use crate::logging::{truncate_field, LogConfig};
use crate::sources::RecordSource;
use crate::statistics::StatisticsAggregator;
use crate::store::{JsonStatisticsStore, StatisticsStore};
use chrono::{DateTime, Utc};
use datafusion::execution::SendableRecordBatchStream;
use datafusion::prelude::SessionContext;
use futures::StreamExt;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, instrument};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    ReadData,
    DecodeData,
    DetectAnomalies,
    GenerateSummaryStatistics,
    WriteStatsOutput,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::ReadData,
        Stage::DecodeData,
        Stage::DetectAnomalies,
        Stage::GenerateSummaryStatistics,
        Stage::WriteStatsOutput,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ReadData => "ReadData",
            Stage::DecodeData => "DecodeData",
            Stage::DetectAnomalies => "DetectAnomalies",
            Stage::GenerateSummaryStatistics => "GenerateSummaryStatistics",
            Stage::WriteStatsOutput => "WriteStatsOutput",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters of one completed pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub output_path: PathBuf,
    pub num_partitions: usize,
    pub num_batches: u64,
    pub num_examples: u64,
    /// Examples with at least one anomaly reason.
    pub num_anomalous_examples: u64,
    /// Slices in the written summary, `All Examples` included.
    pub num_slices: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

struct PartitionOutcome<T> {
    accumulator: T,
    num_batches: u64,
    num_examples: u64,
    num_anomalous_examples: u64,
}

/// Composes a record source, decoder, anomaly detector, statistics aggregator
/// and statistics store.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use term_validate::anomalies::SchemaAnomalyDetector;
/// use term_validate::options::StatsOptions;
/// use term_validate::pipeline::Pipeline;
/// use term_validate::schema::{FeatureSpec, Schema};
/// use term_validate::sources::FileRecordSource;
/// use term_validate::statistics::SlicedStatisticsGenerator;
/// use datafusion::prelude::SessionContext;
///
/// # async fn example() -> term_validate::error::Result<()> {
/// let schema = Arc::new(Schema::builder().feature(FeatureSpec::int("x").required()).build());
/// let pipeline = Pipeline::builder()
///     .source(FileRecordSource::new("data/*.jsonl"))
///     .detector(SchemaAnomalyDetector::new(schema.clone()))
///     .aggregator(SlicedStatisticsGenerator::new(
///         StatsOptions::builder().shared_schema(schema).build(),
///     ))
///     .output_path("/tmp/anomaly_stats")
///     .build()?;
///
/// let run = pipeline.run(&SessionContext::new()).await?;
/// println!("{} examples, {} anomalous", run.num_examples, run.num_anomalous_examples);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Pipeline<A: StatisticsAggregator> {
    source: Arc<dyn RecordSource>,
    decoder: Arc<dyn RecordDecoder>,
    detector: Arc<dyn AnomalyDetector>,
    aggregator: Arc<A>,
    store: Arc<dyn StatisticsStore>,
    output_path: PathBuf,
    log_config: LogConfig,
}

impl<A: StatisticsAggregator> Pipeline<A> {
    pub fn builder() -> PipelineBuilder<A> {
        PipelineBuilder::default()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn store(&self) -> &Arc<dyn StatisticsStore> {
        &self.store
    }

    /// Runs every stage to completion and writes the summary.
    #[instrument(skip(self, ctx), fields(
        source = %self.source.description(),
        output = %self.output_path.display()
    ))]
    pub async fn run(&self, ctx: &SessionContext) -> Result<PipelineRun> {
        let started_at = Utc::now();
        let output = truncate_field(
            &self.output_path.display().to_string(),
            self.log_config.max_field_length,
        );
        info!(
            stage = %Stage::ReadData,
            source = %truncate_field(&self.source.description(), self.log_config.max_field_length),
            "Starting validation pipeline"
        );

        let df = self.source.read(ctx).await?;
        let streams = df.execute_stream_partitioned().await?;
        let num_partitions = streams.len();
        crate::log_data_op!(
            self.log_config,
            stage = %Stage::ReadData,
            partitions = num_partitions,
            "Record streams planned"
        );

        info!(
            stages = %format!("{} -> {} -> {}", Stage::DecodeData, Stage::DetectAnomalies, Stage::GenerateSummaryStatistics),
            partitions = num_partitions,
            "Processing partitions"
        );

        // Dropping the set on an early return aborts the remaining partitions.
        let mut tasks = JoinSet::new();
        for (partition, stream) in streams.into_iter().enumerate() {
            let decoder = Arc::clone(&self.decoder);
            let detector = Arc::clone(&self.detector);
            let aggregator = Arc::clone(&self.aggregator);
            let log_config = self.log_config.clone();

            tasks.spawn(async move {
                process_partition(partition, stream, decoder, detector, aggregator, log_config)
                    .await
                    .map(|outcome| (partition, outcome))
            });
        }

        let mut outcomes = Vec::with_capacity(num_partitions);
        while let Some(joined) = tasks.join_next().await {
            let (partition, outcome) = joined
                .map_err(|e| TermError::Internal(format!("Partition task failed: {e}")))??;
            outcomes.push((partition, outcome));
        }
        outcomes.sort_by_key(|(partition, _)| *partition);

        let mut accumulators = Vec::with_capacity(num_partitions);
        let mut num_batches = 0;
        let mut num_examples = 0;
        let mut num_anomalous_examples = 0;
        for (_, outcome) in outcomes {
            num_batches += outcome.num_batches;
            num_examples += outcome.num_examples;
            num_anomalous_examples += outcome.num_anomalous_examples;
            accumulators.push(outcome.accumulator);
        }

        let merged = self.aggregator.merge_accumulators(accumulators)?;
        let statistics = self.aggregator.extract_output(merged)?;
        info!(
            stage = %Stage::GenerateSummaryStatistics,
            examples = num_examples,
            anomalous = num_anomalous_examples,
            slices = statistics.len(),
            "Summary statistics generated"
        );

        self.store.write(&statistics, &self.output_path).await?;
        info!(stage = %Stage::WriteStatsOutput, output = %output, "Statistics written");

        let run = PipelineRun {
            output_path: self.output_path.clone(),
            num_partitions,
            num_batches,
            num_examples,
            num_anomalous_examples,
            num_slices: statistics.len(),
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            duration_ms = run.duration_ms(),
            examples = run.num_examples,
            "Validation pipeline completed"
        );
        Ok(run)
    }
}

/// Reads one partition stream. Decoding, detection and accumulation of each
/// batch run on the blocking pool.
async fn process_partition<A: StatisticsAggregator>(
    partition: usize,
    mut stream: SendableRecordBatchStream,
    decoder: Arc<dyn RecordDecoder>,
    detector: Arc<dyn AnomalyDetector>,
    aggregator: Arc<A>,
    log_config: LogConfig,
) -> Result<PartitionOutcome<A::Accumulator>> {
    let mut outcome = PartitionOutcome {
        accumulator: aggregator.create_accumulator(),
        num_batches: 0,
        num_examples: 0,
        num_anomalous_examples: 0,
    };

    while let Some(batch) = stream.next().await {
        let batch = batch?;
        let decoder = Arc::clone(&decoder);
        let detector = Arc::clone(&detector);
        let aggregator = Arc::clone(&aggregator);
        let mut accumulator = outcome.accumulator;

        let (accumulator, examples, anomalous) =
            tokio::task::spawn_blocking(move || -> Result<_> {
                let mut examples: u64 = 0;
                let mut anomalous: u64 = 0;
                for example in decoder.decode(&batch)? {
                    let reasons = detector.detect(&example);
                    let tagged = TaggedExample::new(example, reasons);
                    if tagged.is_anomalous() {
                        anomalous += 1;
                    }
                    aggregator.add_example(&mut accumulator, &tagged)?;
                    examples += 1;
                }
                Ok((accumulator, examples, anomalous))
            })
            .await
            .map_err(|e| TermError::Internal(format!("Batch task failed: {e}")))??;

        outcome = PartitionOutcome {
            accumulator,
            num_batches: outcome.num_batches + 1,
            num_examples: outcome.num_examples + examples,
            num_anomalous_examples: outcome.num_anomalous_examples + anomalous,
        };
    }

    crate::log_stage!(
        log_config,
        partition,
        batches = outcome.num_batches,
        examples = outcome.num_examples,
        anomalous = outcome.num_anomalous_examples,
        "Partition accumulated"
    );
    Ok(outcome)
}

/// Builder for [`Pipeline`]. Source, detector, aggregator and output path are
/// required; the decoder defaults to [`ArrowExampleDecoder`] and the store to
/// [`JsonStatisticsStore`].
#[derive(Debug)]
pub struct PipelineBuilder<A> {
    source: Option<Arc<dyn RecordSource>>,
    decoder: Option<Arc<dyn RecordDecoder>>,
    detector: Option<Arc<dyn AnomalyDetector>>,
    aggregator: Option<A>,
    store: Option<Arc<dyn StatisticsStore>>,
    output_path: Option<PathBuf>,
    log_config: LogConfig,
}

impl<A> Default for PipelineBuilder<A> {
    fn default() -> Self {
        Self {
            source: None,
            decoder: None,
            detector: None,
            aggregator: None,
            store: None,
            output_path: None,
            log_config: LogConfig::default(),
        }
    }
}

impl<A: StatisticsAggregator> PipelineBuilder<A> {
    pub fn source(self, source: impl RecordSource + 'static) -> Self {
        self.shared_source(Arc::new(source))
    }

    pub fn shared_source(mut self, source: Arc<dyn RecordSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn decoder(mut self, decoder: impl RecordDecoder + 'static) -> Self {
        self.decoder = Some(Arc::new(decoder));
        self
    }

    pub fn detector(mut self, detector: impl AnomalyDetector + 'static) -> Self {
        self.detector = Some(Arc::new(detector));
        self
    }

    pub fn aggregator(mut self, aggregator: A) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn store(mut self, store: impl StatisticsStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn log_config(mut self, config: LogConfig) -> Self {
        self.log_config = config;
        self
    }

    pub fn build(self) -> Result<Pipeline<A>> {
        fn missing(component: &str) -> TermError {
            TermError::Configuration(format!("Pipeline requires a {component}"))
        }

        Ok(Pipeline {
            source: self.source.ok_or_else(|| missing("record source"))?,
            decoder: self
                .decoder
                .unwrap_or_else(|| Arc::new(ArrowExampleDecoder::new())),
            detector: self.detector.ok_or_else(|| missing("anomaly detector"))?,
            aggregator: Arc::new(self.aggregator.ok_or_else(|| missing("statistics aggregator"))?),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(JsonStatisticsStore::new())),
            output_path: self.output_path.ok_or_else(|| missing("output path"))?,
            log_config: self.log_config,
        })
    }
}
