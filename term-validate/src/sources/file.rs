//! File-pattern record source for CSV, TSV, newline-delimited JSON and Parquet.

use super::{expand_globs, RecordSource};
use crate::error::{Result, TermError};
use async_trait::async_trait;
use datafusion::prelude::{
    CsvReadOptions, DataFrame, NdJsonReadOptions, ParquetReadOptions, SessionContext,
};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument};

/// On-disk layout of record files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// Comma-separated values with a header row
    Csv,
    /// Tab-separated values with a header row
    Tsv,
    /// One JSON object per line
    Json,
    Parquet,
}

impl RecordFormat {
    /// Infers the format from a file extension, case-insensitively.
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_lowercase();
        if lower.ends_with(".csv") {
            Some(Self::Csv)
        } else if lower.ends_with(".tsv") {
            Some(Self::Tsv)
        } else if lower.ends_with(".json") || lower.ends_with(".jsonl") || lower.ends_with(".ndjson")
        {
            Some(Self::Json)
        } else if lower.ends_with(".parquet") {
            Some(Self::Parquet)
        } else {
            None
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Json => "json",
            Self::Parquet => "parquet",
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RecordFormat {
    type Err = TermError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "json" | "jsonl" | "ndjson" => Ok(Self::Json),
            "parquet" => Ok(Self::Parquet),
            other => Err(TermError::Configuration(format!(
                "Unknown record format '{other}', expected csv, tsv, json or parquet"
            ))),
        }
    }
}

/// Reads every file matched by one or more glob patterns.
///
/// The format is inferred from the file extensions unless set with
/// [`with_format`](Self::with_format); matched files of different formats are
/// rejected.
///
/// ```rust
/// use term_validate::sources::{FileRecordSource, RecordFormat};
///
/// let source = FileRecordSource::new("data/part-*.txt").with_format(RecordFormat::Json);
/// assert_eq!(source.patterns(), ["data/part-*.txt".to_string()]);
/// ```
#[derive(Debug, Clone)]
pub struct FileRecordSource {
    patterns: Vec<String>,
    format: Option<RecordFormat>,
}

impl FileRecordSource {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            patterns: vec![pattern.into()],
            format: None,
        }
    }

    /// Reads the union of files matched by several patterns.
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            format: None,
        }
    }

    pub fn with_format(mut self, format: RecordFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Expands the patterns and settles on one format.
    pub fn resolve(&self) -> Result<(Vec<String>, RecordFormat)> {
        let paths = expand_globs(&self.patterns)?;

        if let Some(format) = self.format {
            return Ok((paths, format));
        }

        let mut detected: Option<RecordFormat> = None;
        for path in &paths {
            let format = RecordFormat::from_path(path).ok_or_else(|| {
                TermError::Configuration(format!(
                    "Cannot infer the record format of '{path}'; set it explicitly"
                ))
            })?;
            match detected {
                None => detected = Some(format),
                Some(previous) if previous != format => {
                    return Err(TermError::Configuration(format!(
                        "Files matched by {} mix {previous} and {format} records",
                        self.patterns.join(", ")
                    )))
                }
                Some(_) => {}
            }
        }

        detected
            .map(|format| (paths, format))
            .ok_or_else(|| TermError::Internal("No files to infer a record format from".to_string()))
    }
}

/// Extension shared by every path (with its leading dot), or an empty string.
fn common_extension(paths: &[String]) -> String {
    let extension = paths
        .first()
        .and_then(|p| Path::new(p).extension())
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();

    if paths.iter().all(|p| p.ends_with(&extension)) {
        extension
    } else {
        String::new()
    }
}

#[async_trait]
impl RecordSource for FileRecordSource {
    #[instrument(skip(self, ctx), fields(patterns = ?self.patterns))]
    async fn read(&self, ctx: &SessionContext) -> Result<DataFrame> {
        let (paths, format) = self.resolve()?;
        let extension = common_extension(&paths);

        info!(files = paths.len(), %format, "Reading record files");
        debug!(?paths, "Matched record files");

        let df = match format {
            RecordFormat::Csv => {
                let options = CsvReadOptions::new().file_extension(&extension);
                ctx.read_csv(paths, options).await?
            }
            RecordFormat::Tsv => {
                let options = CsvReadOptions::new()
                    .delimiter(b'\t')
                    .file_extension(&extension);
                ctx.read_csv(paths, options).await?
            }
            RecordFormat::Json => {
                let options = NdJsonReadOptions::default().file_extension(&extension);
                ctx.read_json(paths, options).await?
            }
            RecordFormat::Parquet => {
                let mut options = ParquetReadOptions::default();
                options.file_extension = &extension;
                ctx.read_parquet(paths, options).await?
            }
        };

        Ok(df)
    }

    fn description(&self) -> String {
        match self.format {
            Some(format) => format!("{format} files matching {}", self.patterns.join(", ")),
            None => format!("files matching {}", self.patterns.join(", ")),
        }
    }
}
