//! Persistence of statistics summaries.
//!
//! A summary is stored as a single JSON document at the requested path, with
//! no shard suffix. Writes go to a temporary sibling file that is renamed over
//! the target, so readers see either the previous content or the new one and
//! concurrent writers resolve to the last rename.

use crate::error::{ErrorContext, Result, TermError};
use crate::statistics::DatasetFeatureStatisticsList;
use async_trait::async_trait;
use std::fmt::Debug;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Writes and reads statistics summaries.
#[async_trait]
pub trait StatisticsStore: Debug + Send + Sync {
    /// Replaces whatever is stored at `path` with `statistics`.
    async fn write(&self, statistics: &DatasetFeatureStatisticsList, path: &Path) -> Result<()>;

    /// Reads the summary stored at `path`.
    async fn load(&self, path: &Path) -> Result<DatasetFeatureStatisticsList>;
}

/// Stores summaries as JSON documents.
#[derive(Debug, Clone, Default)]
pub struct JsonStatisticsStore {
    pretty: bool,
}

impl JsonStatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indents the written JSON.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

#[async_trait]
impl StatisticsStore for JsonStatisticsStore {
    #[instrument(skip(self, statistics), fields(path = %path.display(), slices = statistics.len()))]
    async fn write(&self, statistics: &DatasetFeatureStatisticsList, path: &Path) -> Result<()> {
        let statistics = statistics.clone();
        let path = path.to_path_buf();
        let pretty = self.pretty;
        tokio::task::spawn_blocking(move || write_json_atomic(&statistics, &path, pretty))
            .await
            .map_err(|e| TermError::Internal(format!("Statistics writer task failed: {e}")))?
    }

    async fn load(&self, path: &Path) -> Result<DatasetFeatureStatisticsList> {
        load_statistics(path).await
    }
}

fn write_json_atomic(
    statistics: &DatasetFeatureStatisticsList,
    path: &Path,
    pretty: bool,
) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = format!(
        ".{}.",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("statistics")
    );

    let mut staged = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(&dir)
        .with_context(|| format!("Failed to stage statistics in {}", dir.display()))?;

    {
        let mut writer = BufWriter::new(staged.as_file_mut());
        if pretty {
            serde_json::to_writer_pretty(&mut writer, statistics)?;
        } else {
            serde_json::to_writer(&mut writer, statistics)?;
        }
        writer.flush()?;
    }
    staged.as_file().sync_all()?;

    staged
        .persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write statistics to {}", path.display()))?;

    debug!(path = %path.display(), "Statistics written");
    Ok(())
}

/// Reads a statistics summary written by [`JsonStatisticsStore`].
///
/// ```rust,no_run
/// use term_validate::store::load_statistics;
///
/// # async fn example() -> term_validate::error::Result<()> {
/// let stats = load_statistics("/tmp/anomaly_stats").await?;
/// println!("{} slices", stats.len());
/// # Ok(())
/// # }
/// ```
pub async fn load_statistics(path: impl AsRef<Path>) -> Result<DatasetFeatureStatisticsList> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || load_statistics_blocking(&path))
        .await
        .map_err(|e| TermError::Internal(format!("Statistics reader task failed: {e}")))?
}

/// Synchronous variant of [`load_statistics`].
pub fn load_statistics_blocking(path: impl AsRef<Path>) -> Result<DatasetFeatureStatisticsList> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open statistics at {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse statistics at {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::{DatasetFeatureStatistics, ALL_EXAMPLES_SLICE};
    use tempfile::TempDir;

    fn sample(num_examples: u64) -> DatasetFeatureStatisticsList {
        DatasetFeatureStatisticsList::new(vec![DatasetFeatureStatistics {
            name: ALL_EXAMPLES_SLICE.to_string(),
            num_examples,
            features: vec![],
        }])
    }

    #[tokio::test]
    async fn test_write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("anomaly_stats");
        let store = JsonStatisticsStore::new();

        store.write(&sample(3), &path).await.unwrap();
        assert_eq!(store.load(&path).await.unwrap(), sample(3));
        assert_eq!(load_statistics_blocking(&path).unwrap(), sample(3));
    }

    #[tokio::test]
    async fn test_overwrite_leaves_single_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("anomaly_stats");
        let store = JsonStatisticsStore::new().pretty(true);

        store.write(&sample(1), &path).await.unwrap();
        store.write(&sample(2), &path).await.unwrap();

        assert_eq!(load_statistics(&path).await.unwrap().datasets[0].num_examples, 2);
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_load_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            load_statistics(&missing).await.unwrap_err(),
            TermError::Io(_)
        ));

        let garbage = dir.path().join("garbage");
        std::fs::write(&garbage, "not json").unwrap();
        assert!(matches!(
            load_statistics(&garbage).await.unwrap_err(),
            TermError::Serialization(_)
        ));
    }

    #[tokio::test]
    async fn test_write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope").join("anomaly_stats");
        let err = JsonStatisticsStore::new().write(&sample(1), &path).await.unwrap_err();
        assert!(matches!(err, TermError::Io(_)));
    }
}
