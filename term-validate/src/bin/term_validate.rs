//! Command-line front end for validating record files against a schema.
//!
//! Prints a summary of the sliced statistics to stdout and exits with 1 when
//! the run fails.

use clap::{Parser, ValueEnum};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;
use term_validate::formatters::{
    FormatterConfig, HumanFormatter, JsonFormatter, MarkdownFormatter, StatisticsFormatter,
};
use term_validate::logging::setup::{init_logging, LoggingConfig};
use term_validate::logging::LogConfig;
use term_validate::options::{ExecutionOptions, StatsOptions};
use term_validate::schema::Schema;
use term_validate::sources::{FileRecordSource, RecordFormat};
use term_validate::validation::ValidateRecordsPipeline;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
    Markdown,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Glob pattern of the record files to validate
    data_location: String,

    /// Schema file (JSON)
    #[arg(long)]
    schema: PathBuf,

    /// Where to write the statistics; defaults to a new temporary directory
    #[arg(long)]
    output: Option<PathBuf>,

    /// Record format when it cannot be inferred from file extensions
    #[arg(long)]
    input_format: Option<String>,

    /// Number of partitions processed in parallel
    #[arg(long)]
    target_partitions: Option<usize>,

    /// Rows per record batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Most frequent values kept per string feature
    #[arg(long)]
    top_values: Option<usize>,

    /// Summary format printed to stdout
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Log pipeline details
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let logging = if args.verbose {
        LoggingConfig::development()
    } else {
        LoggingConfig::default()
    }
    .with_json_format(args.json_logs);
    if let Err(e) = init_logging(logging) {
        eprintln!("Failed to initialize logging: {e}");
    }

    match run(&args).await {
        Ok(output) => print!("{output}"),
        Err(e) => {
            error!(error = %e, "Validation failed");
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

async fn run(args: &Args) -> term_validate::error::Result<String> {
    let schema = Schema::from_json_file(&args.schema)?;

    let mut stats_options = StatsOptions::builder().schema(schema);
    if let Some(n) = args.top_values {
        stats_options = stats_options.num_top_values(n);
    }

    let mut execution_options = ExecutionOptions::new();
    if let Some(n) = args.target_partitions {
        execution_options = execution_options.with_target_partitions(n);
    }
    if let Some(n) = args.batch_size {
        execution_options = execution_options.with_batch_size(n);
    }

    let mut source = FileRecordSource::new(&args.data_location);
    if let Some(format) = &args.input_format {
        source = source.with_format(format.parse::<RecordFormat>()?);
    }

    let mut pipeline = ValidateRecordsPipeline::from_source(source, stats_options.build())
        .with_execution_options(execution_options)
        .with_log_config(if args.verbose {
            LogConfig::verbose()
        } else {
            LogConfig::default()
        });
    if let Some(output) = &args.output {
        pipeline = pipeline.with_output_path(output);
    }

    let (stats, run) = pipeline.run_with_report().await?;
    info!(
        output = %run.output_path.display(),
        examples = run.num_examples,
        anomalous = run.num_anomalous_examples,
        duration_ms = run.duration_ms(),
        "Statistics written"
    );

    let mut output = match args.format {
        OutputFormat::Human => {
            let colors = use_colors(
                std::io::stdout().is_terminal(),
                std::env::var_os("NO_COLOR").is_some(),
            );
            HumanFormatter::with_config(FormatterConfig::default().with_colors(colors))
                .format(&stats)?
        }
        OutputFormat::Json => JsonFormatter::new().format(&stats)?,
        OutputFormat::Markdown => MarkdownFormatter::new().format(&stats)?,
    };
    if matches!(args.format, OutputFormat::Human) {
        output.push_str(&format!("Statistics: {}\n", run.output_path.display()));
    }
    Ok(output)
}

/// ANSI colors only when stdout is a terminal and `NO_COLOR` is unset.
fn use_colors(stdout_is_terminal: bool, no_color: bool) -> bool {
    stdout_is_terminal && !no_color
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colors_only_on_terminal() {
        assert!(use_colors(true, false));
        assert!(!use_colors(false, false));
        assert!(!use_colors(true, true));
    }

    #[test]
    fn test_plain_summary_when_piped() {
        let formatter = HumanFormatter::with_config(
            FormatterConfig::default().with_colors(use_colors(false, false)),
        );
        let stats = term_validate::statistics::DatasetFeatureStatisticsList::new(vec![
            term_validate::statistics::DatasetFeatureStatistics {
                name: "All Examples".to_string(),
                num_examples: 2,
                features: vec![],
            },
        ]);
        let output = formatter.format(&stats).unwrap();
        assert!(!output.contains('\u{1b}'));
    }

    #[test]
    fn test_parse_args() {
        let args = Args::parse_from([
            "term-validate",
            "data/*.jsonl",
            "--schema",
            "schema.json",
            "--format",
            "json",
        ]);
        assert_eq!(args.data_location, "data/*.jsonl");
        assert!(matches!(args.format, OutputFormat::Json));
        assert!(args.output.is_none());
    }
}
