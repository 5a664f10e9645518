//! Decoding of Arrow record batches into examples.
//!
//! An [`Example`] is the unit the anomaly detector and the statistics
//! aggregator work on: a set of named features, each carrying zero or more
//! values of a single type. A null cell means the feature is absent from that
//! example, while an empty list means it is present with no values.

use crate::error::{Result, TermError};
use crate::schema::FeatureType;
use arrow::array::{Array, ArrayRef, AsArray, StringArray};
use arrow::compute::{cast_with_options, CastOptions};
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use arrow::record_batch::RecordBatch;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Values of one feature within one example.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValues {
    Int(Vec<i64>),
    Float(Vec<f64>),
    String(Vec<String>),
}

impl FeatureValues {
    /// Type of the carried values.
    pub fn feature_type(&self) -> FeatureType {
        match self {
            FeatureValues::Int(_) => FeatureType::Int,
            FeatureValues::Float(_) => FeatureType::Float,
            FeatureValues::String(_) => FeatureType::String,
        }
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        match self {
            FeatureValues::Int(v) => v.len(),
            FeatureValues::Float(v) => v.len(),
            FeatureValues::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<i64> for FeatureValues {
    fn from(value: i64) -> Self {
        FeatureValues::Int(vec![value])
    }
}

impl From<f64> for FeatureValues {
    fn from(value: f64) -> Self {
        FeatureValues::Float(vec![value])
    }
}

impl From<&str> for FeatureValues {
    fn from(value: &str) -> Self {
        FeatureValues::String(vec![value.to_string()])
    }
}

impl From<Vec<i64>> for FeatureValues {
    fn from(values: Vec<i64>) -> Self {
        FeatureValues::Int(values)
    }
}

impl From<Vec<f64>> for FeatureValues {
    fn from(values: Vec<f64>) -> Self {
        FeatureValues::Float(values)
    }
}

impl From<Vec<String>> for FeatureValues {
    fn from(values: Vec<String>) -> Self {
        FeatureValues::String(values)
    }
}

/// A single decoded record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Example {
    features: BTreeMap<String, FeatureValues>,
}

impl Example {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a feature, consuming and returning the example.
    pub fn with_feature(mut self, name: impl Into<String>, values: impl Into<FeatureValues>) -> Self {
        self.insert(name, values);
        self
    }

    /// Sets the values of a feature, replacing previous values.
    pub fn insert(&mut self, name: impl Into<String>, values: impl Into<FeatureValues>) {
        self.features.insert(name.into(), values.into());
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValues> {
        self.features.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    /// Iterates over present features in name order.
    pub fn features(&self) -> impl Iterator<Item = (&str, &FeatureValues)> {
        self.features.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of present features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Turns raw record batches into examples.
pub trait RecordDecoder: Debug + Send + Sync {
    /// Decodes every row of the batch, preserving row order.
    fn decode(&self, batch: &RecordBatch) -> Result<Vec<Example>>;
}

/// Column-oriented decoder for Arrow record batches.
///
/// | Arrow type | Feature |
/// |---|---|
/// | integers, booleans | `Int` |
/// | floats, `Decimal128` | `Float` |
/// | UTF-8, binary, dates, times, timestamps | `String` |
/// | `List` / `LargeList` of the above | multi-valued feature |
/// | `Null` | always missing |
#[derive(Debug, Clone, Default)]
pub struct ArrowExampleDecoder;

impl ArrowExampleDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl RecordDecoder for ArrowExampleDecoder {
    fn decode(&self, batch: &RecordBatch) -> Result<Vec<Example>> {
        let mut examples = vec![Example::new(); batch.num_rows()];
        let schema = batch.schema();

        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            let name = field.name();
            let values = decode_column(name, column)?;
            for (example, value) in examples.iter_mut().zip(values) {
                if let Some(value) = value {
                    example.features.insert(name.clone(), value);
                }
            }
        }

        Ok(examples)
    }
}

/// Maps an Arrow scalar type onto a feature type.
fn scalar_feature_type(data_type: &DataType) -> Option<FeatureType> {
    match data_type {
        DataType::Boolean
        | DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Some(FeatureType::Int),
        DataType::Float16 | DataType::Float32 | DataType::Float64 | DataType::Decimal128(_, _) => {
            Some(FeatureType::Float)
        }
        DataType::Utf8
        | DataType::LargeUtf8
        | DataType::Utf8View
        | DataType::Binary
        | DataType::LargeBinary
        | DataType::Date32
        | DataType::Date64
        | DataType::Time32(_)
        | DataType::Time64(_)
        | DataType::Timestamp(_, _) => Some(FeatureType::String),
        DataType::Dictionary(_, value_type) => scalar_feature_type(value_type),
        _ => None,
    }
}

fn decode_column(name: &str, column: &ArrayRef) -> Result<Vec<Option<FeatureValues>>> {
    match column.data_type() {
        DataType::Null => Ok(vec![None; column.len()]),
        DataType::List(item) => {
            let feature_type = list_item_type(name, item.data_type())?;
            let list = column.as_list::<i32>();
            (0..list.len())
                .map(|row| {
                    if list.is_null(row) {
                        Ok(None)
                    } else {
                        collect_values(name, &list.value(row), feature_type).map(Some)
                    }
                })
                .collect()
        }
        DataType::LargeList(item) => {
            let feature_type = list_item_type(name, item.data_type())?;
            let list = column.as_list::<i64>();
            (0..list.len())
                .map(|row| {
                    if list.is_null(row) {
                        Ok(None)
                    } else {
                        collect_values(name, &list.value(row), feature_type).map(Some)
                    }
                })
                .collect()
        }
        other => {
            let feature_type = scalar_feature_type(other).ok_or_else(|| {
                TermError::decode(name, format!("unsupported column type {other}"))
            })?;
            decode_scalars(name, column, feature_type)
        }
    }
}

fn list_item_type(name: &str, item_type: &DataType) -> Result<FeatureType> {
    scalar_feature_type(item_type).ok_or_else(|| {
        TermError::decode(name, format!("unsupported list item type {item_type}"))
    })
}

/// Casts an array to the canonical Arrow type of the feature type.
///
/// Casts are strict: a present value that does not fit the target type is a
/// decode error, never a null. Binary values are decoded as UTF-8 with invalid
/// sequences replaced.
fn canonicalize(name: &str, array: &ArrayRef, feature_type: FeatureType) -> Result<ArrayRef> {
    let target = match feature_type {
        FeatureType::Int => DataType::Int64,
        FeatureType::Float => DataType::Float64,
        FeatureType::String => DataType::Utf8,
    };
    match array.data_type() {
        data_type if data_type == &target => Ok(array.clone()),
        DataType::Binary => Ok(lossy_utf8(array.as_binary::<i32>().iter())),
        DataType::LargeBinary => Ok(lossy_utf8(array.as_binary::<i64>().iter())),
        _ => {
            let options = CastOptions {
                safe: false,
                ..Default::default()
            };
            cast_with_options(array.as_ref(), &target, &options)
                .map_err(|e| TermError::decode(name, e.to_string()))
        }
    }
}

fn lossy_utf8<'a>(values: impl Iterator<Item = Option<&'a [u8]>>) -> ArrayRef {
    let strings: StringArray = values
        .map(|v| v.map(String::from_utf8_lossy))
        .collect();
    Arc::new(strings)
}

fn decode_scalars(
    name: &str,
    array: &ArrayRef,
    feature_type: FeatureType,
) -> Result<Vec<Option<FeatureValues>>> {
    let array = canonicalize(name, array, feature_type)?;
    let decoded: Vec<Option<FeatureValues>> = match feature_type {
        FeatureType::Int => array
            .as_primitive::<Int64Type>()
            .iter()
            .map(|v| v.map(FeatureValues::from))
            .collect(),
        FeatureType::Float => array
            .as_primitive::<Float64Type>()
            .iter()
            .map(|v| v.map(FeatureValues::from))
            .collect(),
        FeatureType::String => array
            .as_string::<i32>()
            .iter()
            .map(|v| v.map(FeatureValues::from))
            .collect(),
    };
    Ok(decoded)
}

/// Collects the non-null elements of a list entry.
fn collect_values(name: &str, array: &ArrayRef, feature_type: FeatureType) -> Result<FeatureValues> {
    let array = canonicalize(name, array, feature_type)?;
    let values = match feature_type {
        FeatureType::Int => {
            FeatureValues::Int(array.as_primitive::<Int64Type>().iter().flatten().collect())
        }
        FeatureType::Float => {
            FeatureValues::Float(array.as_primitive::<Float64Type>().iter().flatten().collect())
        }
        FeatureType::String => FeatureValues::String(
            array
                .as_string::<i32>()
                .iter()
                .flatten()
                .map(str::to_string)
                .collect(),
        ),
    };
    Ok(values)
}
