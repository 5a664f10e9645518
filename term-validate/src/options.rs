//! Configuration for statistics generation and pipeline execution.

use crate::error::{Result, TermError};
use crate::schema::Schema;
use datafusion::prelude::{SessionConfig, SessionContext};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Options for anomaly detection and statistics generation.
///
/// The schema is optional at construction time, but
/// [`validate_examples_in_files`](crate::validation::validate_examples_in_files)
/// refuses to run without one.
///
/// # Examples
///
/// ```rust
/// use term_validate::options::StatsOptions;
/// use term_validate::schema::{FeatureSpec, Schema};
///
/// let schema = Schema::builder()
///     .feature(FeatureSpec::int("age").required())
///     .build();
///
/// let options = StatsOptions::builder()
///     .schema(schema)
///     .num_top_values(5)
///     .build();
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct StatsOptions {
    /// Schema every example is checked against.
    pub schema: Option<Arc<Schema>>,
    /// Number of most frequent values kept for string features.
    pub num_top_values: usize,
    /// Buckets of the equal-width histogram of numeric features.
    pub num_histogram_buckets: usize,
    /// Buckets of the quantiles histogram of numeric features.
    pub num_quantiles_histogram_buckets: usize,
    /// Buckets of the quantiles histogram of values-per-example.
    pub num_values_histogram_buckets: usize,
    /// When set, statistics are only computed for these features.
    pub feature_allowlist: Option<Vec<String>>,
    /// Accuracy parameter of the quantile sketches; quantiles are exact up
    /// to this many values per feature and slice.
    pub sketch_size: usize,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            schema: None,
            num_top_values: 20,
            num_histogram_buckets: 10,
            num_quantiles_histogram_buckets: 10,
            num_values_histogram_buckets: 10,
            feature_allowlist: None,
            sketch_size: 200,
        }
    }
}

impl StatsOptions {
    /// Creates a new options builder starting from the defaults.
    pub fn builder() -> StatsOptionsBuilder {
        StatsOptionsBuilder {
            options: Self::default(),
        }
    }

    /// Returns the schema or a configuration error when none was provided.
    pub fn require_schema(&self) -> Result<&Arc<Schema>> {
        self.schema.as_ref().ok_or_else(|| {
            TermError::Configuration("The specified stats options must include a schema".to_string())
        })
    }

    /// Checks the numeric knobs and, when present, the schema.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("num_histogram_buckets", self.num_histogram_buckets),
            ("num_quantiles_histogram_buckets", self.num_quantiles_histogram_buckets),
            ("num_values_histogram_buckets", self.num_values_histogram_buckets),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(TermError::Configuration(format!(
                    "{name} must be greater than zero"
                )));
            }
        }
        if self.sketch_size < 8 {
            return Err(TermError::Configuration(format!(
                "sketch_size must be at least 8, got {}",
                self.sketch_size
            )));
        }
        if let Some(schema) = &self.schema {
            schema.validate()?;
        }
        Ok(())
    }

    /// Whether statistics should be computed for the named feature.
    pub fn is_feature_allowed(&self, name: &str) -> bool {
        self.feature_allowlist
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|f| f == name))
    }
}

/// Fluent builder for [`StatsOptions`].
#[derive(Debug, Clone)]
pub struct StatsOptionsBuilder {
    options: StatsOptions,
}

impl StatsOptionsBuilder {
    pub fn schema(mut self, schema: Schema) -> Self {
        self.options.schema = Some(Arc::new(schema));
        self
    }

    pub fn shared_schema(mut self, schema: Arc<Schema>) -> Self {
        self.options.schema = Some(schema);
        self
    }

    pub fn num_top_values(mut self, n: usize) -> Self {
        self.options.num_top_values = n;
        self
    }

    pub fn num_histogram_buckets(mut self, n: usize) -> Self {
        self.options.num_histogram_buckets = n;
        self
    }

    pub fn num_quantiles_histogram_buckets(mut self, n: usize) -> Self {
        self.options.num_quantiles_histogram_buckets = n;
        self
    }

    pub fn num_values_histogram_buckets(mut self, n: usize) -> Self {
        self.options.num_values_histogram_buckets = n;
        self
    }

    pub fn feature_allowlist<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.feature_allowlist = Some(features.into_iter().map(Into::into).collect());
        self
    }

    pub fn sketch_size(mut self, k: usize) -> Self {
        self.options.sketch_size = k;
        self
    }

    pub fn build(self) -> StatsOptions {
        self.options
    }
}

/// Parameters handed to the execution engine.
///
/// The pipeline does not interpret these; they are turned into a DataFusion
/// [`SessionConfig`]. Any DataFusion configuration key can be passed through
/// [`with_setting`](Self::with_setting).
///
/// ```rust
/// use term_validate::options::ExecutionOptions;
///
/// let options = ExecutionOptions::new()
///     .with_target_partitions(4)
///     .with_setting("datafusion.execution.coalesce_batches", "false");
/// let ctx = options.session_context().unwrap();
/// assert_eq!(ctx.copied_config().target_partitions(), 4);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Number of partitions the input is split into.
    pub target_partitions: Option<usize>,
    /// Rows per record batch.
    pub batch_size: Option<usize>,
    /// Raw DataFusion configuration entries (`datafusion.*` keys).
    pub settings: BTreeMap<String, String>,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target_partitions(mut self, n: usize) -> Self {
        self.target_partitions = Some(n);
        self
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = Some(n);
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Builds the DataFusion session configuration.
    pub fn session_config(&self) -> Result<SessionConfig> {
        let mut config = SessionConfig::new();

        if let Some(n) = self.target_partitions {
            if n == 0 {
                return Err(TermError::Configuration(
                    "target_partitions must be greater than zero".to_string(),
                ));
            }
            config = config.with_target_partitions(n);
        }
        if let Some(n) = self.batch_size {
            if n == 0 {
                return Err(TermError::Configuration(
                    "batch_size must be greater than zero".to_string(),
                ));
            }
            config = config.with_batch_size(n);
        }
        for (key, value) in &self.settings {
            config.options_mut().set(key, value).map_err(|e| {
                TermError::Configuration(format!("Invalid execution setting '{key}': {e}"))
            })?;
        }

        Ok(config)
    }

    /// Creates a session context configured with these options.
    pub fn session_context(&self) -> Result<SessionContext> {
        Ok(SessionContext::new_with_config(self.session_config()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureSpec;

    #[test]
    fn test_defaults() {
        let options = StatsOptions::default();
        assert!(options.schema.is_none());
        assert_eq!(options.num_top_values, 20);
        assert_eq!(options.num_histogram_buckets, 10);
        assert_eq!(options.sketch_size, 200);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_require_schema() {
        let err = StatsOptions::default().require_schema().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("must include a schema"));

        let options = StatsOptions::builder()
            .schema(Schema::builder().feature(FeatureSpec::int("a")).build())
            .build();
        assert_eq!(options.require_schema().unwrap().features.len(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_knobs() {
        let options = StatsOptions::builder().num_histogram_buckets(0).build();
        assert!(options.validate().unwrap_err().is_configuration());

        let options = StatsOptions::builder().sketch_size(2).build();
        assert!(options.validate().is_err());

        let invalid_schema = Schema::builder()
            .feature(FeatureSpec::int("a"))
            .feature(FeatureSpec::int("a"))
            .build();
        let options = StatsOptions::builder().schema(invalid_schema).build();
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_feature_allowlist() {
        let options = StatsOptions::builder().feature_allowlist(["a", "b"]).build();
        assert!(options.is_feature_allowed("a"));
        assert!(!options.is_feature_allowed("c"));
        assert!(StatsOptions::default().is_feature_allowed("anything"));
    }

    #[test]
    fn test_execution_options_session_config() {
        let config = ExecutionOptions::new()
            .with_target_partitions(3)
            .with_batch_size(128)
            .with_setting("datafusion.execution.coalesce_batches", "false")
            .session_config()
            .unwrap();
        assert_eq!(config.target_partitions(), 3);
        assert_eq!(config.batch_size(), 128);
        assert!(!config.options().execution.coalesce_batches);
    }

    #[test]
    fn test_execution_options_errors() {
        let err = ExecutionOptions::new()
            .with_setting("not.a.real.key", "1")
            .session_config()
            .unwrap_err();
        assert!(err.is_configuration());

        let err = ExecutionOptions::new()
            .with_target_partitions(0)
            .session_config()
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
