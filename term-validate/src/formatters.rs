//! Rendering of statistics summaries.
//!
//! Formatters turn a [`DatasetFeatureStatisticsList`] into JSON, console text
//! or Markdown. They only read the summary; the persisted format is owned by
//! the [`store`](crate::store).
//!
//! # Examples
//!
//! ```rust
//! use term_validate::formatters::{HumanFormatter, StatisticsFormatter};
//! use term_validate::statistics::DatasetFeatureStatisticsList;
//!
//! let formatter = HumanFormatter::new();
//! let output = formatter.format(&DatasetFeatureStatisticsList::default()).unwrap();
//! assert!(output.contains("No statistics"));
//! ```

use crate::error::{Result, TermError};
use crate::statistics::{
    DatasetFeatureStatistics, DatasetFeatureStatisticsList, FeatureNameStatistics, FeatureStats,
};
use std::fmt::{self, Write};

/// Controls how much of a summary is rendered.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Render per-feature statistics of the `All Examples` slice
    pub include_features: bool,
    /// Maximum number of anomaly slices to show (-1 for all)
    pub max_slices: i32,
    /// Top values listed per string feature
    pub max_top_values: usize,
    /// Whether to use ANSI colors (human formatter)
    pub use_colors: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            include_features: true,
            max_slices: -1,
            max_top_values: 3,
            use_colors: true,
        }
    }
}

impl FormatterConfig {
    /// Only slice counts.
    pub fn minimal() -> Self {
        Self {
            include_features: false,
            max_slices: -1,
            max_top_values: 0,
            use_colors: false,
        }
    }

    pub fn detailed() -> Self {
        Self {
            include_features: true,
            max_slices: -1,
            max_top_values: 10,
            use_colors: true,
        }
    }

    /// Bounded, uncolored output for CI logs.
    pub fn ci() -> Self {
        Self {
            include_features: true,
            max_slices: 50,
            max_top_values: 3,
            use_colors: false,
        }
    }

    pub fn with_features(mut self, include: bool) -> Self {
        self.include_features = include;
        self
    }

    pub fn with_max_slices(mut self, max: i32) -> Self {
        self.max_slices = max;
        self
    }

    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }
}

/// Renders a statistics summary.
///
/// ```rust
/// use term_validate::formatters::StatisticsFormatter;
/// use term_validate::statistics::DatasetFeatureStatisticsList;
///
/// struct SliceCount;
///
/// impl StatisticsFormatter for SliceCount {
///     fn format(&self, stats: &DatasetFeatureStatisticsList) -> term_validate::error::Result<String> {
///         Ok(format!("{} slices", stats.len()))
///     }
/// }
/// ```
pub trait StatisticsFormatter {
    fn format(&self, stats: &DatasetFeatureStatisticsList) -> Result<String>;

    fn format_with_config(
        &self,
        stats: &DatasetFeatureStatisticsList,
        _config: &FormatterConfig,
    ) -> Result<String> {
        self.format(stats)
    }
}

fn render_error(e: fmt::Error) -> TermError {
    TermError::Internal(format!("Failed to render statistics: {e}"))
}

/// Anomaly slices to show under `config`.
fn visible_slices<'a>(
    stats: &'a DatasetFeatureStatisticsList,
    config: &FormatterConfig,
) -> Vec<&'a DatasetFeatureStatistics> {
    let slices: Vec<_> = stats.anomaly_slices().collect();
    if config.max_slices < 0 {
        slices
    } else {
        slices.into_iter().take(config.max_slices as usize).collect()
    }
}

fn share(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// One-line description of a feature's values.
fn feature_summary(feature: &FeatureNameStatistics, max_top_values: usize) -> String {
    match &feature.stats {
        FeatureStats::Numeric(numeric) => format!(
            "mean {:.3}, std {:.3}, min {}, median {}, max {}, zeros {}, nan {}",
            numeric.mean,
            numeric.std_dev,
            numeric.min,
            numeric.median,
            numeric.max,
            numeric.num_zeros,
            numeric.num_nan
        ),
        FeatureStats::String(strings) => {
            let top: Vec<String> = strings
                .top_values
                .iter()
                .take(max_top_values)
                .map(|v| format!("{} ({})", v.value, v.frequency))
                .collect();
            if top.is_empty() {
                format!("unique {}, avg length {:.1}", strings.unique, strings.avg_length)
            } else {
                format!(
                    "unique {}, avg length {:.1}, top {}",
                    strings.unique,
                    strings.avg_length,
                    top.join(", ")
                )
            }
        }
    }
}

/// Drops what `config` excludes, for structured output.
fn filter_for_config(
    stats: &DatasetFeatureStatisticsList,
    config: &FormatterConfig,
) -> DatasetFeatureStatisticsList {
    let mut datasets: Vec<DatasetFeatureStatistics> = stats.global().into_iter().cloned().collect();
    datasets.extend(visible_slices(stats, config).into_iter().cloned());
    if !config.include_features {
        for dataset in &mut datasets {
            dataset.features.clear();
        }
    }
    DatasetFeatureStatisticsList::new(datasets)
}

/// Serializes the summary as JSON.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    config: FormatterConfig,
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            pretty: true,
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            pretty: true,
        }
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsFormatter for JsonFormatter {
    fn format(&self, stats: &DatasetFeatureStatisticsList) -> Result<String> {
        self.format_with_config(stats, &self.config)
    }

    fn format_with_config(
        &self,
        stats: &DatasetFeatureStatisticsList,
        config: &FormatterConfig,
    ) -> Result<String> {
        let filtered = filter_for_config(stats, config);
        let json = if self.pretty {
            serde_json::to_string_pretty(&filtered)?
        } else {
            serde_json::to_string(&filtered)?
        };
        Ok(json)
    }
}

/// Console-friendly text.
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter {
    config: FormatterConfig,
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }

    fn render(
        &self,
        stats: &DatasetFeatureStatisticsList,
        config: &FormatterConfig,
        out: &mut String,
    ) -> fmt::Result {
        let paint = |text: String, code: &str| {
            if config.use_colors {
                format!("\x1b[{code}m{text}\x1b[0m")
            } else {
                text
            }
        };

        writeln!(out)?;
        let Some(global) = stats.global() else {
            writeln!(out, "No statistics available")?;
            return Ok(());
        };

        let num_slices = stats.anomaly_slices().count();
        if num_slices == 0 {
            writeln!(out, "✅ {}", paint("No anomalies found".to_string(), "32"))?;
        } else {
            writeln!(
                out,
                "❌ {}",
                paint(format!("{num_slices} anomaly reason(s) found"), "31")
            )?;
        }

        writeln!(out)?;
        writeln!(out, "Examples: {}", global.num_examples)?;
        writeln!(out, "Features: {}", global.features.len())?;

        let slices = visible_slices(stats, config);
        if !slices.is_empty() {
            writeln!(out)?;
            writeln!(out, "🔍 Anomaly Slices:")?;
            for slice in &slices {
                writeln!(
                    out,
                    "   {}: {} examples ({:.1}%)",
                    paint(slice.name.clone(), "33"),
                    slice.num_examples,
                    share(slice.num_examples, global.num_examples)
                )?;
            }
            if num_slices > slices.len() {
                writeln!(out, "   ... and {} more slices", num_slices - slices.len())?;
            }
        }

        if config.include_features && !global.features.is_empty() {
            writeln!(out)?;
            writeln!(out, "📊 Features ({}):", global.name)?;
            for feature in &global.features {
                let common = feature.common();
                writeln!(
                    out,
                    "   {} ({}): present {}/{}, values {}..{}",
                    feature.name,
                    feature.feature_type,
                    common.num_non_missing,
                    global.num_examples,
                    common.min_num_values,
                    common.max_num_values
                )?;
                writeln!(out, "      {}", feature_summary(feature, config.max_top_values))?;
            }
        }

        writeln!(out)
    }
}

impl StatisticsFormatter for HumanFormatter {
    fn format(&self, stats: &DatasetFeatureStatisticsList) -> Result<String> {
        self.format_with_config(stats, &self.config)
    }

    fn format_with_config(
        &self,
        stats: &DatasetFeatureStatisticsList,
        config: &FormatterConfig,
    ) -> Result<String> {
        let mut output = String::new();
        self.render(stats, config, &mut output).map_err(render_error)?;
        Ok(output)
    }
}

/// Markdown tables for reports.
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    config: FormatterConfig,
    heading_level: u8,
}

impl MarkdownFormatter {
    pub fn new() -> Self {
        Self {
            config: FormatterConfig::default(),
            heading_level: 2,
        }
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self {
            config,
            heading_level: 2,
        }
    }

    /// Sets the base heading level, clamped to 1..=5.
    pub fn with_heading_level(mut self, level: u8) -> Self {
        self.heading_level = level.clamp(1, 5);
        self
    }

    fn render(
        &self,
        stats: &DatasetFeatureStatisticsList,
        config: &FormatterConfig,
        out: &mut String,
    ) -> fmt::Result {
        let h = "#".repeat(self.heading_level as usize);
        writeln!(out, "{h} Anomaly Statistics")?;
        writeln!(out)?;

        let Some(global) = stats.global() else {
            writeln!(out, "_No statistics available._")?;
            return Ok(());
        };

        writeln!(out, "{h}# Slices")?;
        writeln!(out)?;
        writeln!(out, "| Slice | Examples | Share |")?;
        writeln!(out, "|-------|----------|-------|")?;
        writeln!(out, "| {} | {} | 100.0% |", global.name, global.num_examples)?;
        for slice in visible_slices(stats, config) {
            writeln!(
                out,
                "| `{}` | {} | {:.1}% |",
                slice.name,
                slice.num_examples,
                share(slice.num_examples, global.num_examples)
            )?;
        }

        if config.include_features && !global.features.is_empty() {
            writeln!(out)?;
            writeln!(out, "{h}# Features")?;
            writeln!(out)?;
            writeln!(out, "| Feature | Type | Present | Missing | Summary |")?;
            writeln!(out, "|---------|------|---------|---------|---------|")?;
            for feature in &global.features {
                let common = feature.common();
                writeln!(
                    out,
                    "| {} | {} | {} | {} | {} |",
                    feature.name,
                    feature.feature_type,
                    common.num_non_missing,
                    common.num_missing,
                    feature_summary(feature, config.max_top_values).replace('|', "\\|")
                )?;
            }
        }
        Ok(())
    }
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsFormatter for MarkdownFormatter {
    fn format(&self, stats: &DatasetFeatureStatisticsList) -> Result<String> {
        self.format_with_config(stats, &self.config)
    }

    fn format_with_config(
        &self,
        stats: &DatasetFeatureStatisticsList,
        config: &FormatterConfig,
    ) -> Result<String> {
        let mut output = String::new();
        self.render(stats, config, &mut output).map_err(render_error)?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureType;
    use crate::statistics::{
        CommonStatistics, FreqAndValue, NumericStatistics, StringStatistics, ALL_EXAMPLES_SLICE,
    };

    fn create_test_stats() -> DatasetFeatureStatisticsList {
        let common = CommonStatistics {
            num_non_missing: 100,
            num_missing: 5,
            min_num_values: 1,
            max_num_values: 1,
            avg_num_values: 1.0,
            tot_num_values: 100,
            num_values_histogram: None,
        };
        DatasetFeatureStatisticsList::new(vec![
            DatasetFeatureStatistics {
                name: ALL_EXAMPLES_SLICE.to_string(),
                num_examples: 105,
                features: vec![
                    FeatureNameStatistics {
                        name: "city".to_string(),
                        feature_type: FeatureType::String,
                        stats: FeatureStats::String(StringStatistics {
                            common: common.clone(),
                            unique: 2,
                            top_values: vec![
                                FreqAndValue {
                                    value: "Paris".to_string(),
                                    frequency: 60,
                                },
                                FreqAndValue {
                                    value: "Lyon".to_string(),
                                    frequency: 40,
                                },
                            ],
                            avg_length: 4.6,
                        }),
                    },
                    FeatureNameStatistics {
                        name: "x".to_string(),
                        feature_type: FeatureType::Int,
                        stats: FeatureStats::Numeric(NumericStatistics {
                            common,
                            mean: 2.5,
                            max: 4.0,
                            ..Default::default()
                        }),
                    },
                ],
            },
            DatasetFeatureStatistics {
                name: "x_SCHEMA_MISSING_COLUMN".to_string(),
                num_examples: 5,
                features: vec![],
            },
            DatasetFeatureStatistics {
                name: "y_SCHEMA_NEW_COLUMN".to_string(),
                num_examples: 1,
                features: vec![],
            },
        ])
    }

    #[test]
    fn test_formatter_config() {
        let minimal = FormatterConfig::minimal();
        assert!(!minimal.include_features);
        assert!(!minimal.use_colors);

        let ci = FormatterConfig::ci();
        assert_eq!(ci.max_slices, 50);

        let custom = FormatterConfig::default().with_max_slices(1).with_colors(false);
        assert_eq!(custom.max_slices, 1);
        assert!(!custom.use_colors);
    }

    #[test]
    fn test_json_formatter() {
        let output = JsonFormatter::new().format(&create_test_stats()).unwrap();
        let parsed: DatasetFeatureStatisticsList = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed, create_test_stats());

        let minimal = JsonFormatter::with_config(FormatterConfig::minimal())
            .with_pretty(false)
            .format(&create_test_stats())
            .unwrap();
        assert!(!minimal.contains("Paris"));
        assert!(minimal.contains("x_SCHEMA_MISSING_COLUMN"));
    }

    #[test]
    fn test_human_formatter() {
        let formatter = HumanFormatter::with_config(FormatterConfig::default().with_colors(false));
        let output = formatter.format(&create_test_stats()).unwrap();
        assert!(output.contains("2 anomaly reason(s) found"));
        assert!(output.contains("Examples: 105"));
        assert!(output.contains("x_SCHEMA_MISSING_COLUMN: 5 examples (4.8%)"));
        assert!(output.contains("Paris (60)"));
        assert!(!output.contains("\x1b["));
    }

    #[test]
    fn test_human_formatter_max_slices() {
        let config = FormatterConfig::minimal().with_max_slices(1);
        let output = HumanFormatter::new()
            .format_with_config(&create_test_stats(), &config)
            .unwrap();
        assert!(output.contains("x_SCHEMA_MISSING_COLUMN"));
        assert!(!output.contains("y_SCHEMA_NEW_COLUMN"));
        assert!(output.contains("... and 1 more slices"));
        assert!(!output.contains("Features ("));
    }

    #[test]
    fn test_markdown_formatter() {
        let output = MarkdownFormatter::new()
            .with_heading_level(3)
            .format(&create_test_stats())
            .unwrap();
        assert!(output.starts_with("### Anomaly Statistics"));
        assert!(output.contains("#### Slices"));
        assert!(output.contains("| `x_SCHEMA_MISSING_COLUMN` | 5 | 4.8% |"));
        assert!(output.contains("| city | string | 100 | 5 |"));
    }

    #[test]
    fn test_empty_summary() {
        let empty = DatasetFeatureStatisticsList::default();
        assert!(HumanFormatter::new().format(&empty).unwrap().contains("No statistics"));
        assert!(MarkdownFormatter::new().format(&empty).unwrap().contains("No statistics"));
    }
}
