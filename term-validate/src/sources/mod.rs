//! Record sources feeding the validation pipeline.
//!
//! A [`RecordSource`] turns some external data into a DataFusion
//! [`DataFrame`]; the pipeline then streams that frame partition by partition.
//! [`FileRecordSource`] reads CSV, newline-delimited JSON and Parquet files
//! matched by a glob pattern, and [`MemoryRecordSource`] serves record batches
//! the caller already holds.

use crate::error::{Result, TermError};
use async_trait::async_trait;
use datafusion::prelude::{DataFrame, SessionContext};
use std::fmt::Debug;

mod file;
mod memory;

pub use file::{FileRecordSource, RecordFormat};
pub use memory::MemoryRecordSource;

/// A source of records that can be read into a DataFusion context.
///
/// # Examples
///
/// ```rust,no_run
/// use term_validate::sources::{FileRecordSource, RecordSource};
/// use datafusion::prelude::SessionContext;
///
/// # async fn example() -> term_validate::error::Result<()> {
/// let source = FileRecordSource::new("data/*.jsonl");
/// let ctx = SessionContext::new();
/// let df = source.read(&ctx).await?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait RecordSource: Debug + Send + Sync {
    /// Reads the records as a DataFrame bound to `ctx`.
    async fn read(&self, ctx: &SessionContext) -> Result<DataFrame>;

    /// Human-readable description for logs.
    fn description(&self) -> String;
}

/// Expands glob patterns into the sorted, de-duplicated list of matching files.
///
/// Directories are skipped. A pattern matching no files is a data source error.
pub fn expand_globs(patterns: &[String]) -> Result<Vec<String>> {
    use glob::glob;

    let mut paths = Vec::new();
    for pattern in patterns {
        let matches = glob(pattern).map_err(|e| {
            TermError::Configuration(format!("Invalid glob pattern '{pattern}': {e}"))
        })?;

        for entry in matches {
            let path = entry.map_err(|e| TermError::Io(e.into()))?;

            if path.is_file() {
                if let Some(path_str) = path.to_str() {
                    paths.push(path_str.to_string());
                }
            }
        }
    }

    if paths.is_empty() {
        return Err(TermError::data_source(
            "file",
            format!("No files found matching {}", patterns.join(", ")),
        ));
    }

    paths.sort();
    paths.dedup();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_expand_globs_sorted_files_only() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.csv"), "a\n1\n").unwrap();
        fs::write(dir.path().join("a.csv"), "a\n1\n").unwrap();
        fs::create_dir(dir.path().join("c.csv")).unwrap();

        let pattern = format!("{}/*.csv", dir.path().display());
        let paths = expand_globs(&[pattern.clone(), pattern]).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("a.csv"));
        assert!(paths[1].ends_with("b.csv"));
    }

    #[test]
    fn test_expand_globs_no_match() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/*.parquet", dir.path().display());
        let err = expand_globs(&[pattern]).unwrap_err();
        assert!(matches!(err, TermError::DataSource { .. }));
    }

    #[test]
    fn test_expand_globs_invalid_pattern() {
        let err = expand_globs(&["data/[".to_string()]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[cfg(unix)]
    #[test]
    fn test_expand_globs_unreadable_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("a.csv"), "a\n1\n").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users read through the permissions.
        let readable = fs::read_dir(&locked).is_ok();
        let result = expand_globs(&[format!("{}/*/*.csv", dir.path().display())]);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        if !readable {
            assert!(matches!(result.unwrap_err(), TermError::Io(_)));
        }
    }
}
