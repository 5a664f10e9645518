//! # term-validate
//!
//! Per-example anomaly validation with sliced summary statistics, built on
//! DataFusion.
//!
//! Every record is decoded into an [`Example`](decode::Example), checked
//! against a [`Schema`](schema::Schema), and tagged with the reasons it is
//! anomalous. Statistics are then computed for all examples and separately
//! for the examples behind each anomaly reason, written to a single JSON file
//! and returned.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use term_validate::prelude::*;
//!
//! # async fn example() -> term_validate::error::Result<()> {
//! let schema = Schema::builder()
//!     .feature(FeatureSpec::int("x").required())
//!     .feature(FeatureSpec::string("city").string_domain(["Paris", "Lyon"]))
//!     .build();
//! let options = StatsOptions::builder().schema(schema).build();
//!
//! let stats = validate_examples_in_files("data/*.jsonl", &options, None, None).await?;
//!
//! for slice in stats.anomaly_slices() {
//!     println!("{}: {} examples", slice.name, slice.num_examples);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Slices
//!
//! The returned [`DatasetFeatureStatisticsList`](statistics::DatasetFeatureStatisticsList)
//! always starts with the `All Examples` slice. Each distinct anomaly reason
//! adds a slice named `{feature}_{KIND}`, for example
//! `x_SCHEMA_MISSING_COLUMN`, in sorted order.
//!
//! ## Pipeline
//!
//! ```text
//! ReadData -> DecodeData -> DetectAnomalies -> GenerateSummaryStatistics -> WriteStatsOutput
//! ```
//!
//! The stages are composed by [`pipeline::Pipeline`]; each collaborator sits
//! behind a trait ([`sources::RecordSource`], [`decode::RecordDecoder`],
//! [`anomalies::AnomalyDetector`], [`statistics::StatisticsAggregator`],
//! [`store::StatisticsStore`]) and can be swapped independently.
//!
//! ## Logging
//!
//! The library emits `tracing` events only. Binaries install a subscriber,
//! for example with [`logging::setup::init_logging`].

pub mod anomalies;
pub mod decode;
pub mod error;
pub mod formatters;
pub mod logging;
pub mod options;
pub mod pipeline;
pub mod prelude;
pub mod schema;
pub mod sources;
pub mod statistics;
pub mod store;
pub mod validation;
