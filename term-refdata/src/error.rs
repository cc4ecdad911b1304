//! Error types for reference data matching.
//!
//! All fallible operations in this crate return [`RefDataError`]. The variants
//! fall into three categories that callers treat differently:
//!
//! - configuration errors (no sources, bad patterns, mismatched schemas) abort a
//!   run before any row is processed,
//! - connection errors abort initialization, while lookup failures during row
//!   processing are degraded to an `Unavailable` outcome by the evaluator,
//! - release errors never abort anything and are collected into a
//!   [`ReleaseErrors`] list attached to the final result.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for reference data matching.
#[derive(Error, Debug)]
pub enum RefDataError {
    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Two aggregate states (or a state and an outcome vector) disagree on the
    /// output schema.
    #[error("Schema mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: String, found: String },

    /// A synonym catalog connection could not be opened.
    #[error("Failed to open connection to synonym catalog '{catalog}': {message}")]
    Connection {
        /// Name of the catalog
        catalog: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A lookup against an open synonym catalog connection failed.
    #[error("Lookup in synonym catalog '{catalog}' failed: {message}")]
    Lookup { catalog: String, message: String },

    /// A connection could not be released.
    #[error(transparent)]
    ResourceRelease(#[from] ReleaseFailure),

    /// Several connections could not be released.
    #[error(transparent)]
    ReleaseErrors(#[from] ReleaseErrors),

    /// A column required by the matchers is not present in the input row.
    #[error("Column '{column}' not found in input row")]
    ColumnNotFound { column: String },

    /// A column value could not be read or converted.
    #[error("Invalid value in column '{column}': {message}")]
    InvalidValue { column: String, message: String },

    /// An aggregate state violates its structural invariants, typically after
    /// being loaded from storage.
    #[error("Invalid aggregate state: {0}")]
    InvalidState(String),

    /// Adding to a counter would exceed `u64::MAX`.
    #[error("Counter overflow in {0}")]
    CounterOverflow(String),

    /// Reduction was requested over zero states.
    #[error("Cannot reduce an empty sequence of aggregate states")]
    EmptyReduction,

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A partition task panicked or was cancelled.
    #[error("Partition task failed: {0}")]
    Task(String),
}

/// A type alias for `Result<T, RefDataError>`.
pub type Result<T> = std::result::Result<T, RefDataError>;

impl RefDataError {
    /// Creates a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a new schema mismatch error.
    pub fn schema_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates a new connection error.
    pub fn connection(catalog: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            catalog: catalog.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new connection error with a source error.
    pub fn connection_with_source(
        catalog: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Connection {
            catalog: catalog.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Creates a new lookup error.
    pub fn lookup(catalog: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Lookup {
            catalog: catalog.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid value error.
    pub fn invalid_value(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors that stem from configuration rather than data or
    /// infrastructure.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::SchemaMismatch { .. })
    }

    /// Returns true for faults that only affect a single row and are recorded as
    /// `Unavailable` instead of aborting the pipeline.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            Self::Lookup { .. } | Self::ColumnNotFound { .. } | Self::InvalidValue { .. }
        )
    }
}

impl From<serde_json::Error> for RefDataError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for RefDataError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Failure to close one synonym catalog connection.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Failed to release connection to synonym catalog '{catalog}': {message}")]
pub struct ReleaseFailure {
    /// Name of the catalog whose connection failed to close
    pub catalog: String,
    /// Detailed error message
    pub message: String,
}

impl ReleaseFailure {
    pub fn new(catalog: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            message: message.into(),
        }
    }
}

/// All release failures collected while shutting down.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[error("{} connection(s) failed to release: {}", .0.len(), summarize(.0))]
pub struct ReleaseErrors(pub Vec<ReleaseFailure>);

impl ReleaseErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReleaseFailure> {
        self.0.iter()
    }

    pub fn push(&mut self, failure: ReleaseFailure) {
        self.0.push(failure);
    }

    pub fn extend(&mut self, other: ReleaseErrors) {
        self.0.extend(other.0);
    }

    /// Converts into `Ok(())` when nothing failed.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(RefDataError::ReleaseErrors(self))
        }
    }
}

fn summarize(failures: &[ReleaseFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.catalog, f.message))
        .collect::<Vec<_>>()
        .join(", ")
}
