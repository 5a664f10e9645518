//! In-memory record source over Arrow record batches.

use super::RecordSource;
use crate::error::{Result, TermError};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use datafusion::datasource::MemTable;
use datafusion::prelude::{DataFrame, SessionContext};
use std::sync::Arc;
use tracing::debug;

/// Serves record batches the caller already holds.
///
/// Each inner vector of [`with_partitions`](Self::with_partitions) becomes one
/// DataFusion partition.
#[derive(Debug, Clone)]
pub struct MemoryRecordSource {
    schema: SchemaRef,
    partitions: Vec<Vec<RecordBatch>>,
}

impl MemoryRecordSource {
    /// Creates a single-partition source. The batches must share a schema and
    /// at least one batch is needed to know it.
    pub fn from_batches(batches: Vec<RecordBatch>) -> Result<Self> {
        let schema = batches
            .first()
            .map(|b| b.schema())
            .ok_or_else(|| TermError::data_source("memory", "At least one record batch is required"))?;
        Ok(Self {
            schema,
            partitions: vec![batches],
        })
    }

    pub fn with_partitions(schema: SchemaRef, partitions: Vec<Vec<RecordBatch>>) -> Self {
        Self { schema, partitions }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.partitions
            .iter()
            .flatten()
            .map(|batch| batch.num_rows())
            .sum()
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn read(&self, ctx: &SessionContext) -> Result<DataFrame> {
        debug!(
            partitions = self.partitions.len(),
            rows = self.num_rows(),
            "Reading in-memory records"
        );
        let table = MemTable::try_new(self.schema.clone(), self.partitions.clone())?;
        Ok(ctx.read_table(Arc::new(table))?)
    }

    fn description(&self) -> String {
        format!(
            "{} in-memory rows in {} partitions",
            self.num_rows(),
            self.partitions.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field, Schema};

    fn batch(values: Vec<i64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(values))]).unwrap()
    }

    #[tokio::test]
    async fn test_read_batches() {
        let source = MemoryRecordSource::from_batches(vec![batch(vec![1, 2]), batch(vec![3])]).unwrap();
        assert_eq!(source.num_rows(), 3);
        assert!(source.description().starts_with("3 in-memory rows"));

        let ctx = SessionContext::new();
        let batches = source.read(&ctx).await.unwrap().collect().await.unwrap();
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 3);
    }

    #[test]
    fn test_empty_batches_rejected() {
        let err = MemoryRecordSource::from_batches(vec![]).unwrap_err();
        assert!(matches!(err, TermError::DataSource { .. }));
    }

    #[tokio::test]
    async fn test_multiple_partitions() {
        let first = batch(vec![1]);
        let schema = first.schema();
        let source = MemoryRecordSource::with_partitions(schema, vec![vec![first], vec![batch(vec![2, 3])]]);
        let ctx = SessionContext::new();
        let df = source.read(&ctx).await.unwrap();
        assert_eq!(df.count().await.unwrap(), 3);
    }
}
