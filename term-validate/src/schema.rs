//! Schema describing the expected shape of every example.
//!
//! A [`Schema`] lists the known features with their value type and optional
//! presence, value-count and domain constraints. Schemas are plain serde
//! types, so they can be written by hand as JSON:
//!
//! ```json
//! {
//!   "features": [
//!     { "name": "age", "type": "int", "presence": { "min_fraction": 1.0 },
//!       "domain": { "kind": "int", "min": 0, "max": 120 } },
//!     { "name": "country", "type": "string",
//!       "domain": { "kind": "string", "values": ["US", "CA"] } }
//!   ]
//! }
//! ```

use crate::error::{Result, TermError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// Value type of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureType {
    /// 64-bit integers (booleans decode to 0/1)
    Int,
    /// 64-bit floats
    Float,
    /// UTF-8 strings
    String,
}

impl FeatureType {
    /// Returns the lowercase name used in schemas and summaries.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureType::Int => "int",
            FeatureType::Float => "float",
            FeatureType::String => "string",
        }
    }

    /// Whether values of this type are summarized with numeric statistics.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FeatureType::Int | FeatureType::Float)
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How often a feature must be present.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeaturePresence {
    /// Minimum fraction of examples carrying the feature; `1.0` makes it required.
    #[serde(default)]
    pub min_fraction: f64,
    /// Minimum number of examples carrying the feature across a dataset.
    ///
    /// Informational only: examples are validated one at a time, so a
    /// dataset-level count is never checked. Presence per example is decided
    /// by `min_fraction` alone.
    #[serde(default)]
    pub min_count: u64,
}

/// Bounds on the number of values a feature carries in one example.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValueCount {
    #[serde(default)]
    pub min: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u64>,
}

/// Allowed values of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Domain {
    /// Inclusive integer range; either end may be open.
    Int {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<i64>,
    },
    /// Inclusive float range; either end may be open.
    Float {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
        #[serde(default)]
        disallow_nan: bool,
    },
    /// Closed set of string values.
    String { values: Vec<String> },
}

/// Constraints for one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub feature_type: FeatureType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<FeaturePresence>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_count: Option<ValueCount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
    /// Deprecated features are known to the schema but never checked.
    #[serde(default)]
    pub deprecated: bool,
}

impl FeatureSpec {
    /// Creates an unconstrained feature of the given type.
    pub fn new(name: impl Into<String>, feature_type: FeatureType) -> Self {
        Self {
            name: name.into(),
            feature_type,
            presence: None,
            value_count: None,
            domain: None,
            deprecated: false,
        }
    }

    /// Creates an unconstrained integer feature.
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, FeatureType::Int)
    }

    /// Creates an unconstrained float feature.
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FeatureType::Float)
    }

    /// Creates an unconstrained string feature.
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FeatureType::String)
    }

    /// Requires the feature in every example.
    pub fn required(mut self) -> Self {
        let presence = self.presence.get_or_insert_with(FeaturePresence::default);
        presence.min_fraction = 1.0;
        presence.min_count = presence.min_count.max(1);
        self
    }

    /// Sets the presence constraint explicitly.
    pub fn presence(mut self, min_fraction: f64, min_count: u64) -> Self {
        self.presence = Some(FeaturePresence {
            min_fraction,
            min_count,
        });
        self
    }

    /// Bounds the number of values per example.
    pub fn value_count(mut self, min: u64, max: Option<u64>) -> Self {
        self.value_count = Some(ValueCount { min, max });
        self
    }

    /// Requires exactly one value per example.
    pub fn single_valued(self) -> Self {
        self.value_count(1, Some(1))
    }

    /// Restricts integer values to an inclusive range.
    pub fn int_domain(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.domain = Some(Domain::Int { min, max });
        self
    }

    /// Restricts float values to an inclusive range.
    pub fn float_domain(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        let disallow_nan = matches!(
            self.domain,
            Some(Domain::Float {
                disallow_nan: true,
                ..
            })
        );
        self.domain = Some(Domain::Float {
            min,
            max,
            disallow_nan,
        });
        self
    }

    /// Flags NaN values as anomalous.
    pub fn disallow_nan(mut self) -> Self {
        match &mut self.domain {
            Some(Domain::Float { disallow_nan, .. }) => *disallow_nan = true,
            _ => {
                self.domain = Some(Domain::Float {
                    min: None,
                    max: None,
                    disallow_nan: true,
                })
            }
        }
        self
    }

    /// Restricts string values to a closed set.
    pub fn string_domain<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domain = Some(Domain::String {
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Marks the feature as deprecated.
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Whether every example must carry this feature.
    pub fn is_required(&self) -> bool {
        self.presence
            .as_ref()
            .is_some_and(|p| p.min_fraction >= 1.0)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| {
            Err(TermError::Configuration(format!(
                "Invalid schema feature '{}': {msg}",
                self.name
            )))
        };

        if self.name.is_empty() {
            return Err(TermError::Configuration(
                "Schema features must have a non-empty name".to_string(),
            ));
        }

        if let Some(presence) = &self.presence {
            if !(0.0..=1.0).contains(&presence.min_fraction) {
                return invalid(format!(
                    "presence.min_fraction must be in [0, 1], got {}",
                    presence.min_fraction
                ));
            }
        }

        if let Some(ValueCount { min, max: Some(max) }) = &self.value_count {
            if min > max {
                return invalid(format!("value_count.min {min} exceeds max {max}"));
            }
        }

        match (&self.domain, self.feature_type) {
            (None, _) => Ok(()),
            (Some(Domain::Int { min, max }), FeatureType::Int) => match (min, max) {
                (Some(lo), Some(hi)) if lo > hi => {
                    invalid(format!("int domain min {lo} exceeds max {hi}"))
                }
                _ => Ok(()),
            },
            (Some(Domain::Float { min, max, .. }), FeatureType::Float) => match (min, max) {
                (Some(lo), Some(hi)) if lo > hi => {
                    invalid(format!("float domain min {lo} exceeds max {hi}"))
                }
                _ => Ok(()),
            },
            (Some(Domain::String { values }), FeatureType::String) => {
                if values.is_empty() {
                    invalid("string domain has no values".to_string())
                } else {
                    Ok(())
                }
            }
            (Some(domain), feature_type) => invalid(format!(
                "{} domain does not apply to a {feature_type} feature",
                domain_kind(domain)
            )),
        }
    }
}

fn domain_kind(domain: &Domain) -> &'static str {
    match domain {
        Domain::Int { .. } => "int",
        Domain::Float { .. } => "float",
        Domain::String { .. } => "string",
    }
}

/// The set of known features and their constraints.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub features: Vec<FeatureSpec>,
    /// When false, features missing from the schema are reported as anomalies.
    #[serde(default)]
    pub allow_new_features: bool,
}

impl Schema {
    /// Creates a new schema builder.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Parses a schema from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| TermError::Configuration(format!("Invalid schema JSON: {e}")))
    }

    /// Loads a schema from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TermError::Configuration(format!(
                "Unable to read schema file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&contents)
    }

    /// Looks up a feature by name.
    pub fn feature(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Checks the schema for internal consistency.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for feature in &self.features {
            if !seen.insert(feature.name.as_str()) {
                return Err(TermError::Configuration(format!(
                    "Schema declares feature '{}' more than once",
                    feature.name
                )));
            }
            feature.validate()?;
        }
        Ok(())
    }
}

/// Fluent builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    features: Vec<FeatureSpec>,
    allow_new_features: bool,
}

impl SchemaBuilder {
    /// Adds a feature.
    pub fn feature(mut self, feature: FeatureSpec) -> Self {
        self.features.push(feature);
        self
    }

    /// Accepts features that the schema does not list.
    pub fn allow_new_features(mut self, allow: bool) -> Self {
        self.allow_new_features = allow;
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            features: self.features,
            allow_new_features: self.allow_new_features,
        }
    }
}
