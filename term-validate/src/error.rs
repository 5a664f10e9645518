//! Error types for the term-validate library.
//!
//! All failures are represented by [`TermError`]. Configuration problems are
//! detected before any pipeline work starts; everything raised while the
//! pipeline runs (I/O, DataFusion, Arrow, decoding, aggregation) is passed to
//! the caller unchanged.

use thiserror::Error;

/// The main error type for the term-validate library.
#[derive(Error, Debug)]
pub enum TermError {
    /// Invalid or incomplete configuration, raised before any work begins.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from record source operations.
    #[error("Data source error: {message}")]
    DataSource {
        /// Type of data source (e.g., "CSV", "Parquet", "file")
        source_type: String,
        /// Detailed error message
        message: String,
    },

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record batch column could not be turned into example features.
    #[error("Decode error in column '{column}': {message}")]
    Decode {
        /// Name of the offending column
        column: String,
        /// Detailed error message
        message: String,
    },

    /// Statistics could not be accumulated or finalized.
    #[error("Statistics error: {0}")]
    Statistics(String),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, TermError>`.
pub type Result<T> = std::result::Result<T, TermError>;

impl TermError {
    /// Creates a new data source error.
    pub fn data_source(source_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataSource {
            source_type: source_type.into(),
            message: message.into(),
        }
    }

    /// Creates a new decode error for the given column.
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors raised before the pipeline starts.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl From<serde_json::Error> for TermError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<TermError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| add_context(msg, e.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| add_context(&f(), e.into()))
    }
}

/// Prefixes the message while keeping the error category, so configuration
/// errors stay distinguishable from execution errors.
fn add_context(msg: &str, err: TermError) -> TermError {
    match err {
        TermError::Configuration(inner) => TermError::Configuration(format!("{msg}: {inner}")),
        TermError::Statistics(inner) => TermError::Statistics(format!("{msg}: {inner}")),
        TermError::Internal(inner) => TermError::Internal(format!("{msg}: {inner}")),
        TermError::Serialization(inner) => TermError::Serialization(format!("{msg}: {inner}")),
        TermError::Io(io) => TermError::Io(std::io::Error::new(io.kind(), format!("{msg}: {io}"))),
        other => TermError::Internal(format!("{msg}: {other}")),
    }
}
