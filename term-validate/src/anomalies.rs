//! Per-example anomaly detection against a [`Schema`].
//!
//! Every example is checked independently and tagged with the reasons it
//! violates the schema. Each distinct reason later becomes its own statistics
//! slice, keyed by [`AnomalyReason::slice_key`].

use crate::decode::{Example, FeatureValues};
use crate::schema::{Domain, FeatureSpec, FeatureType, Schema};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

/// Category of a schema violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    /// A required feature is absent.
    SchemaMissingColumn,
    /// The example carries a feature the schema does not know.
    SchemaNewColumn,
    /// Values are of a different type than declared.
    UnexpectedDataType,
    /// Fewer values than `value_count.min`.
    FeatureTypeLowNumberValues,
    /// More values than `value_count.max`.
    FeatureTypeHighNumberValues,
    IntTypeSmallInt,
    IntTypeBigInt,
    FloatTypeSmallFloat,
    FloatTypeBigFloat,
    FloatTypeHasNan,
    /// A string outside the declared domain.
    EnumTypeUnexpectedStringValues,
}

impl AnomalyKind {
    /// Stable upper-case name, used in slice keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::SchemaMissingColumn => "SCHEMA_MISSING_COLUMN",
            AnomalyKind::SchemaNewColumn => "SCHEMA_NEW_COLUMN",
            AnomalyKind::UnexpectedDataType => "UNEXPECTED_DATA_TYPE",
            AnomalyKind::FeatureTypeLowNumberValues => "FEATURE_TYPE_LOW_NUMBER_VALUES",
            AnomalyKind::FeatureTypeHighNumberValues => "FEATURE_TYPE_HIGH_NUMBER_VALUES",
            AnomalyKind::IntTypeSmallInt => "INT_TYPE_SMALL_INT",
            AnomalyKind::IntTypeBigInt => "INT_TYPE_BIG_INT",
            AnomalyKind::FloatTypeSmallFloat => "FLOAT_TYPE_SMALL_FLOAT",
            AnomalyKind::FloatTypeBigFloat => "FLOAT_TYPE_BIG_FLOAT",
            AnomalyKind::FloatTypeHasNan => "FLOAT_TYPE_HAS_NAN",
            AnomalyKind::EnumTypeUnexpectedStringValues => "ENUM_TYPE_UNEXPECTED_STRING_VALUES",
        }
    }

    /// Short human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            AnomalyKind::SchemaMissingColumn => "required feature is missing",
            AnomalyKind::SchemaNewColumn => "feature is not in the schema",
            AnomalyKind::UnexpectedDataType => "values have an unexpected type",
            AnomalyKind::FeatureTypeLowNumberValues => "too few values",
            AnomalyKind::FeatureTypeHighNumberValues => "too many values",
            AnomalyKind::IntTypeSmallInt => "integer below the domain minimum",
            AnomalyKind::IntTypeBigInt => "integer above the domain maximum",
            AnomalyKind::FloatTypeSmallFloat => "float below the domain minimum",
            AnomalyKind::FloatTypeBigFloat => "float above the domain maximum",
            AnomalyKind::FloatTypeHasNan => "NaN value where NaN is disallowed",
            AnomalyKind::EnumTypeUnexpectedStringValues => "string outside the domain",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reason an example is anomalous.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnomalyReason {
    pub feature: String,
    pub kind: AnomalyKind,
}

impl AnomalyReason {
    pub fn new(feature: impl Into<String>, kind: AnomalyKind) -> Self {
        Self {
            feature: feature.into(),
            kind,
        }
    }

    /// Name of the statistics slice collecting examples with this reason.
    pub fn slice_key(&self) -> String {
        format!("{}_{}", self.feature, self.kind.as_str())
    }
}

impl fmt::Display for AnomalyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.feature, self.kind.as_str())
    }
}

/// An example together with the reasons it violates the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedExample {
    pub example: Example,
    /// Sorted and free of duplicates.
    pub reasons: Vec<AnomalyReason>,
}

impl TaggedExample {
    pub fn new(example: Example, reasons: Vec<AnomalyReason>) -> Self {
        Self { example, reasons }
    }

    pub fn is_anomalous(&self) -> bool {
        !self.reasons.is_empty()
    }
}

/// Tags examples with anomaly reasons.
pub trait AnomalyDetector: Debug + Send + Sync {
    /// Returns the sorted, de-duplicated reasons the example is anomalous.
    fn detect(&self, example: &Example) -> Vec<AnomalyReason>;
}

/// Checks each example against the constraints of a [`Schema`].
#[derive(Debug, Clone)]
pub struct SchemaAnomalyDetector {
    schema: Arc<Schema>,
    known_features: HashSet<String>,
    string_domains: HashMap<String, HashSet<String>>,
}

impl SchemaAnomalyDetector {
    pub fn new(schema: Arc<Schema>) -> Self {
        let known_features = schema.features.iter().map(|f| f.name.clone()).collect();
        let string_domains = schema
            .features
            .iter()
            .filter_map(|f| match &f.domain {
                Some(Domain::String { values }) => {
                    Some((f.name.clone(), values.iter().cloned().collect()))
                }
                _ => None,
            })
            .collect();

        Self {
            schema,
            known_features,
            string_domains,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn check_values(
        &self,
        spec: &FeatureSpec,
        values: &FeatureValues,
        reasons: &mut BTreeSet<AnomalyReason>,
    ) {
        let mut flag = |kind| {
            reasons.insert(AnomalyReason::new(spec.name.as_str(), kind));
        };

        let compatible = match (spec.feature_type, values) {
            (FeatureType::Int, FeatureValues::Int(_)) => true,
            // integers widen to float
            (FeatureType::Float, FeatureValues::Int(_) | FeatureValues::Float(_)) => true,
            (FeatureType::String, FeatureValues::String(_)) => true,
            _ => false,
        };
        if !compatible {
            flag(AnomalyKind::UnexpectedDataType);
            return;
        }

        if let Some(count) = &spec.value_count {
            let n = values.len() as u64;
            if n < count.min {
                flag(AnomalyKind::FeatureTypeLowNumberValues);
            }
            if count.max.is_some_and(|max| n > max) {
                flag(AnomalyKind::FeatureTypeHighNumberValues);
            }
        }

        match (&spec.domain, values) {
            (Some(Domain::Int { min, max }), FeatureValues::Int(ints)) => {
                if let Some(min) = min {
                    if ints.iter().any(|v| v < min) {
                        flag(AnomalyKind::IntTypeSmallInt);
                    }
                }
                if let Some(max) = max {
                    if ints.iter().any(|v| v > max) {
                        flag(AnomalyKind::IntTypeBigInt);
                    }
                }
            }
            (
                Some(Domain::Float {
                    min,
                    max,
                    disallow_nan,
                }),
                values,
            ) => {
                let floats: Vec<f64> = match values {
                    FeatureValues::Float(v) => v.clone(),
                    FeatureValues::Int(v) => v.iter().map(|&i| i as f64).collect(),
                    FeatureValues::String(_) => Vec::new(),
                };
                if *disallow_nan && floats.iter().any(|v| v.is_nan()) {
                    flag(AnomalyKind::FloatTypeHasNan);
                }
                if let Some(min) = min {
                    if floats.iter().any(|v| v < min) {
                        flag(AnomalyKind::FloatTypeSmallFloat);
                    }
                }
                if let Some(max) = max {
                    if floats.iter().any(|v| v > max) {
                        flag(AnomalyKind::FloatTypeBigFloat);
                    }
                }
            }
            (Some(Domain::String { .. }), FeatureValues::String(strings)) => {
                if let Some(allowed) = self.string_domains.get(&spec.name) {
                    if strings.iter().any(|s| !allowed.contains(s)) {
                        flag(AnomalyKind::EnumTypeUnexpectedStringValues);
                    }
                }
            }
            _ => {}
        }
    }
}

impl AnomalyDetector for SchemaAnomalyDetector {
    fn detect(&self, example: &Example) -> Vec<AnomalyReason> {
        let mut reasons = BTreeSet::new();

        for spec in self.schema.features.iter().filter(|f| !f.deprecated) {
            match example.get(&spec.name) {
                None if spec.is_required() => {
                    reasons.insert(AnomalyReason::new(
                        spec.name.as_str(),
                        AnomalyKind::SchemaMissingColumn,
                    ));
                }
                None => {}
                Some(values) => self.check_values(spec, values, &mut reasons),
            }
        }

        if !self.schema.allow_new_features {
            for (name, _) in example.features() {
                if !self.known_features.contains(name) {
                    reasons.insert(AnomalyReason::new(name, AnomalyKind::SchemaNewColumn));
                }
            }
        }

        reasons.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> SchemaAnomalyDetector {
        let schema = Schema::builder()
            .feature(FeatureSpec::int("age").required().int_domain(Some(0), Some(120)))
            .feature(
                FeatureSpec::float("score")
                    .float_domain(Some(0.0), Some(1.0))
                    .disallow_nan(),
            )
            .feature(FeatureSpec::string("country").string_domain(["US", "CA"]))
            .feature(FeatureSpec::string("tags").value_count(1, Some(2)))
            .feature(FeatureSpec::int("legacy").required().deprecated())
            .build();
        SchemaAnomalyDetector::new(Arc::new(schema))
    }

    fn kinds(reasons: &[AnomalyReason]) -> Vec<(&str, AnomalyKind)> {
        reasons.iter().map(|r| (r.feature.as_str(), r.kind)).collect()
    }

    #[test]
    fn test_valid_example_has_no_reasons() {
        let example = Example::new()
            .with_feature("age", 30i64)
            .with_feature("score", 0.5f64)
            .with_feature("country", "US")
            .with_feature("tags", vec!["a".to_string()]);
        assert!(detector().detect(&example).is_empty());
    }

    #[test]
    fn test_missing_required_feature() {
        let example = Example::new().with_feature("score", 0.5f64);
        let reasons = detector().detect(&example);
        // deprecated "legacy" is never reported
        assert_eq!(
            kinds(&reasons),
            vec![("age", AnomalyKind::SchemaMissingColumn)]
        );
        assert_eq!(reasons[0].slice_key(), "age_SCHEMA_MISSING_COLUMN");
        assert_eq!(reasons[0].to_string(), "age_SCHEMA_MISSING_COLUMN");
    }

    #[test]
    fn test_presence_min_count_is_not_checked_per_example() {
        let schema = Schema::builder()
            .feature(FeatureSpec::int("id").presence(0.5, 10))
            .build();
        let detector = SchemaAnomalyDetector::new(Arc::new(schema));
        assert!(detector.detect(&Example::new()).is_empty());
        assert!(detector.detect(&Example::new().with_feature("id", 1i64)).is_empty());
    }

    #[test]
    fn test_domain_violations() {
        let example = Example::new()
            .with_feature("age", vec![-1i64, 200])
            .with_feature("score", vec![f64::NAN, 2.0f64])
            .with_feature("country", "FR");
        let reasons = detector().detect(&example);
        assert_eq!(
            kinds(&reasons),
            vec![
                ("age", AnomalyKind::IntTypeSmallInt),
                ("age", AnomalyKind::IntTypeBigInt),
                ("country", AnomalyKind::EnumTypeUnexpectedStringValues),
                ("score", AnomalyKind::FloatTypeBigFloat),
                ("score", AnomalyKind::FloatTypeHasNan),
            ]
        );
    }

    #[test]
    fn test_value_count_and_type() {
        let too_many = Example::new()
            .with_feature("age", 1i64)
            .with_feature("tags", vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(
            kinds(&detector().detect(&too_many)),
            vec![("tags", AnomalyKind::FeatureTypeHighNumberValues)]
        );

        let too_few = Example::new()
            .with_feature("age", 1i64)
            .with_feature("tags", Vec::<String>::new());
        assert_eq!(
            kinds(&detector().detect(&too_few)),
            vec![("tags", AnomalyKind::FeatureTypeLowNumberValues)]
        );

        let wrong_type = Example::new().with_feature("age", "thirty");
        assert_eq!(
            kinds(&detector().detect(&wrong_type)),
            vec![("age", AnomalyKind::UnexpectedDataType)]
        );

        // ints are accepted for float features
        let widened = Example::new()
            .with_feature("age", 1i64)
            .with_feature("score", 1i64);
        assert!(detector().detect(&widened).is_empty());
    }

    #[test]
    fn test_new_column() {
        let example = Example::new()
            .with_feature("age", 1i64)
            .with_feature("surprise", 1i64);
        assert_eq!(
            kinds(&detector().detect(&example)),
            vec![("surprise", AnomalyKind::SchemaNewColumn)]
        );

        let mut schema = (**detector().schema()).clone();
        schema.allow_new_features = true;
        let lenient = SchemaAnomalyDetector::new(Arc::new(schema));
        assert!(lenient.detect(&example).is_empty());
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&AnomalyKind::FloatTypeHasNan).unwrap();
        assert_eq!(json, "\"FLOAT_TYPE_HAS_NAN\"");
        assert_eq!(
            AnomalyKind::EnumTypeUnexpectedStringValues.to_string(),
            "ENUM_TYPE_UNEXPECTED_STRING_VALUES"
        );
    }
}
