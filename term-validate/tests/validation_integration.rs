//! End-to-end tests for validating record files and reloading the sliced
//! statistics.

use arrow::array::{BinaryArray, Float64Array, Int64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use term_validate::prelude::*;
use term_validate::statistics::HistogramType;
use term_validate::validation::{resolve_output_path, DEFAULT_OUTPUT_FILE};

fn schema() -> Schema {
    Schema::builder()
        .feature(FeatureSpec::int("x").required().int_domain(Some(0), Some(1000)))
        .feature(FeatureSpec::string("color").string_domain(["red", "green", "blue"]))
        .build()
}

fn options() -> StatsOptions {
    StatsOptions::builder().schema(schema()).build()
}

/// Writes `good` conforming rows and `missing_x` rows without `x`, spread over
/// `files` NDJSON files.
fn write_records(dir: &Path, good: usize, missing_x: usize, files: usize) -> String {
    let mut lines: Vec<String> = (0..good)
        .map(|i| {
            let color = ["red", "green", "blue"][i % 3];
            format!("{{\"x\": {i}, \"color\": \"{color}\"}}")
        })
        .collect();
    lines.extend((0..missing_x).map(|_| "{\"color\": \"red\"}".to_string()));

    let per_file = lines.len().div_ceil(files);
    for (i, chunk) in lines.chunks(per_file).enumerate() {
        fs::write(dir.join(format!("part-{i:03}.jsonl")), chunk.join("\n") + "\n").unwrap();
    }
    format!("{}/part-*.jsonl", dir.display())
}

#[tokio::test]
async fn test_missing_schema_has_no_side_effects() {
    let dir = TempDir::new().unwrap();
    let pattern = write_records(dir.path(), 5, 0, 1);
    let output = dir.path().join("out").join("nested").join("stats");

    let err = ValidateRecordsPipeline::new(&pattern, StatsOptions::default())
        .with_output_path(&output)
        .run()
        .await
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(err.to_string().contains("must include a schema"));
    assert!(!dir.path().join("out").exists());
}

#[tokio::test]
async fn test_default_output_paths_do_not_collide() {
    let dir = TempDir::new().unwrap();
    let pattern = write_records(dir.path(), 10, 0, 1);

    let (_, first) = ValidateRecordsPipeline::new(&pattern, options())
        .run_with_report()
        .await
        .unwrap();
    let (_, second) = ValidateRecordsPipeline::new(&pattern, options())
        .run_with_report()
        .await
        .unwrap();

    assert_eq!(first.output_path.file_name().unwrap(), DEFAULT_OUTPUT_FILE);
    assert_eq!(second.output_path.file_name().unwrap(), DEFAULT_OUTPUT_FILE);
    assert_ne!(first.output_path, second.output_path);
    assert!(first.output_path.is_file());
    assert!(second.output_path.is_file());

    for run in [first, second] {
        fs::remove_dir_all(run.output_path.parent().unwrap()).unwrap();
    }
}

#[tokio::test]
async fn test_same_output_path_twice() {
    let dir = TempDir::new().unwrap();
    let pattern = write_records(dir.path(), 10, 2, 1);
    let output = dir.path().join("out").join("anomaly_stats");

    let first = validate_examples_in_files(&pattern, &options(), Some(&output), None)
        .await
        .unwrap();
    let second = validate_examples_in_files(&pattern, &options(), Some(&output), None)
        .await
        .unwrap();

    assert_eq!(first, second);
    let entries: Vec<_> = fs::read_dir(dir.path().join("out")).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn test_returned_statistics_match_reloaded_file() {
    let dir = TempDir::new().unwrap();
    let pattern = write_records(dir.path(), 40, 3, 3);
    let output = dir.path().join("anomaly_stats");

    let stats = validate_examples_in_files(
        &pattern,
        &options(),
        Some(&output),
        Some(ExecutionOptions::new().with_target_partitions(3)),
    )
    .await
    .unwrap();

    assert_eq!(stats, load_statistics(&output).await.unwrap());
}

#[tokio::test]
async fn test_conforming_records_yield_only_global_slice() {
    let dir = TempDir::new().unwrap();
    let pattern = write_records(dir.path(), 30, 0, 2);

    let stats = validate_examples_in_files(&pattern, &options(), None, None)
        .await
        .unwrap();

    assert_eq!(stats.slice_names(), vec![ALL_EXAMPLES_SLICE]);
    assert_eq!(stats.anomaly_slices().count(), 0);
    assert_eq!(stats.global().unwrap().num_examples, 30);
}

#[tokio::test]
async fn test_single_anomaly_reason_yields_two_slices() {
    let dir = TempDir::new().unwrap();
    let pattern = write_records(dir.path(), 100, 5, 4);
    let output = dir.path().join("stats").join("anomaly_stats");

    let stats = validate_examples_in_files(
        &pattern,
        &options(),
        Some(&output),
        Some(ExecutionOptions::new().with_target_partitions(4).with_batch_size(16)),
    )
    .await
    .unwrap();

    assert_eq!(
        stats.slice_names(),
        vec![ALL_EXAMPLES_SLICE, "x_SCHEMA_MISSING_COLUMN"]
    );
    assert_eq!(stats.global().unwrap().num_examples, 105);

    let missing = stats.slice("x_SCHEMA_MISSING_COLUMN").unwrap();
    assert_eq!(missing.num_examples, 5);
    assert!(missing.feature("x").is_none());
    let color = missing.feature("color").unwrap().string().unwrap();
    assert_eq!(color.common.num_non_missing, 5);
    assert_eq!(color.unique, 1);
    assert_eq!(color.top_values[0].value, "red");
    assert_eq!(color.top_values[0].frequency, 5);
}

#[tokio::test]
async fn test_global_numeric_statistics() {
    let dir = TempDir::new().unwrap();
    let pattern = write_records(dir.path(), 100, 5, 2);

    let stats = validate_examples_in_files(&pattern, &options(), None, None)
        .await
        .unwrap();
    let x = stats.global().unwrap().feature("x").unwrap().numeric().unwrap();

    assert_eq!(x.common.num_non_missing, 100);
    assert_eq!(x.common.num_missing, 5);
    assert_eq!(x.common.tot_num_values, 100);
    assert_eq!(x.min, 0.0);
    assert_eq!(x.max, 99.0);
    assert!((x.mean - 49.5).abs() < 1e-9);
    assert_eq!(x.num_zeros, 1);
    assert!((x.median - 49.5).abs() <= 1.0);

    let standard = x.histogram(HistogramType::Standard).unwrap();
    assert_eq!(standard.buckets.len(), 10);
    assert!((standard.total_count() - 100.0).abs() < 1e-9);
    let quantiles = x.histogram(HistogramType::Quantiles).unwrap();
    assert!((quantiles.total_count() - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_multiple_reasons_per_example() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("data.jsonl"),
        concat!(
            "{\"x\": 1, \"color\": \"red\"}\n",
            "{\"x\": 5000, \"color\": \"purple\"}\n",
            "{\"x\": -1, \"color\": \"purple\"}\n",
        ),
    )
    .unwrap();

    let stats = validate_examples_in_files(
        &format!("{}/*.jsonl", dir.path().display()),
        &options(),
        None,
        None,
    )
    .await
    .unwrap();

    assert_eq!(
        stats.slice_names(),
        vec![
            ALL_EXAMPLES_SLICE,
            "color_ENUM_TYPE_UNEXPECTED_STRING_VALUES",
            "x_INT_TYPE_BIG_INT",
            "x_INT_TYPE_SMALL_INT",
        ]
    );
    assert_eq!(
        stats
            .slice("color_ENUM_TYPE_UNEXPECTED_STRING_VALUES")
            .unwrap()
            .num_examples,
        2
    );
    assert_eq!(stats.slice("x_INT_TYPE_BIG_INT").unwrap().num_examples, 1);
}

#[tokio::test]
async fn test_in_memory_partitions() {
    let arrow_schema = Arc::new(ArrowSchema::new(vec![
        Field::new("x", DataType::Int64, true),
        Field::new("score", DataType::Float64, true),
        Field::new("color", DataType::Utf8, true),
    ]));
    let batch = |xs: Vec<Option<i64>>| {
        let n = xs.len();
        RecordBatch::try_new(
            arrow_schema.clone(),
            vec![
                Arc::new(Int64Array::from(xs)),
                Arc::new(Float64Array::from(vec![Some(0.5); n])),
                Arc::new(StringArray::from(vec![Some("blue"); n])),
            ],
        )
        .unwrap()
    };
    let source = MemoryRecordSource::with_partitions(
        arrow_schema.clone(),
        vec![
            vec![batch(vec![Some(1), Some(2)])],
            vec![batch(vec![None, Some(4)])],
            vec![batch(vec![Some(5), None, Some(7)])],
        ],
    );
    let schema = Schema::builder()
        .feature(FeatureSpec::int("x").required())
        .feature(FeatureSpec::float("score"))
        .feature(FeatureSpec::string("color"))
        .build();
    let dir = TempDir::new().unwrap();

    let (stats, run) = ValidateRecordsPipeline::from_source(
        source,
        StatsOptions::builder().schema(schema).build(),
    )
    .with_output_path(dir.path().join("anomaly_stats"))
    .run_with_report()
    .await
    .unwrap();

    assert_eq!(run.num_examples, 7);
    assert_eq!(run.num_anomalous_examples, 2);
    assert_eq!(stats.global().unwrap().num_examples, 7);
    assert_eq!(stats.slice("x_SCHEMA_MISSING_COLUMN").unwrap().num_examples, 2);
}

#[tokio::test]
async fn test_extreme_floats_round_trip() {
    let arrow_schema = Arc::new(ArrowSchema::new(vec![Field::new("f", DataType::Float64, true)]));
    let batch = RecordBatch::try_new(
        arrow_schema,
        vec![Arc::new(Float64Array::from(vec![1e308, 1e308, -f64::MAX]))],
    )
    .unwrap();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("anomaly_stats");

    let stats = ValidateRecordsPipeline::from_source(
        MemoryRecordSource::from_batches(vec![batch]).unwrap(),
        StatsOptions::builder()
            .schema(Schema::builder().feature(FeatureSpec::float("f")).build())
            .build(),
    )
    .with_output_path(&output)
    .run()
    .await
    .unwrap();

    let f = stats.global().unwrap().feature("f").unwrap().numeric().unwrap();
    assert!(f.mean.is_finite());
    assert!(f.std_dev.is_finite());
    assert_eq!(f.max, 1e308);
    assert_eq!(stats, load_statistics(&output).await.unwrap());
}

#[tokio::test]
async fn test_present_binary_and_unsigned_values_are_not_missing() {
    let arrow_schema = Arc::new(ArrowSchema::new(vec![
        Field::new("u", DataType::UInt64, false),
        Field::new("b", DataType::Binary, false),
    ]));
    let batch = |u: u64| {
        RecordBatch::try_new(
            arrow_schema.clone(),
            vec![
                Arc::new(UInt64Array::from(vec![u])),
                Arc::new(BinaryArray::from(vec![&[0xff_u8, 0xfe][..]])),
            ],
        )
        .unwrap()
    };
    let options = StatsOptions::builder()
        .schema(
            Schema::builder()
                .feature(FeatureSpec::int("u").required())
                .feature(FeatureSpec::string("b").required())
                .build(),
        )
        .build();
    let dir = TempDir::new().unwrap();

    let stats = ValidateRecordsPipeline::from_source(
        MemoryRecordSource::from_batches(vec![batch(42)]).unwrap(),
        options.clone(),
    )
    .with_output_path(dir.path().join("in_range"))
    .run()
    .await
    .unwrap();
    assert_eq!(stats.slice_names(), vec![ALL_EXAMPLES_SLICE]);

    let err = ValidateRecordsPipeline::from_source(
        MemoryRecordSource::from_batches(vec![batch(u64::MAX)]).unwrap(),
        options,
    )
    .with_output_path(dir.path().join("overflow"))
    .run()
    .await
    .unwrap_err();
    assert!(matches!(err, TermError::Decode { ref column, .. } if column == "u"));
}

#[tokio::test]
async fn test_unmatched_pattern_is_a_data_source_error() {
    let dir = TempDir::new().unwrap();
    let err = validate_examples_in_files(
        &format!("{}/*.jsonl", dir.path().display()),
        &options(),
        Some(&dir.path().join("anomaly_stats")),
        None,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, TermError::DataSource { .. }));
}

#[test]
fn test_resolve_output_path_prefers_given_path() {
    let given = Path::new("relative/anomaly_stats");
    assert_eq!(resolve_output_path(Some(given)).unwrap(), given);
}
