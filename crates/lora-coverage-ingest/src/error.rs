//! Error types for log ingestion and export

use std::{error::Error as StdError, fmt, path::PathBuf};

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors that abort an ingestion or export run
///
/// Per-line problems never show up here; they are counted in the
/// [`IngestSummary`](crate::IngestSummary) instead.
#[derive(Debug)]
pub enum IngestError {
    /// Store connection, schema or query failure
    Store(lora_coverage_core::Error),

    /// I/O error
    Io(std::io::Error),

    /// Configuration error
    Configuration {
        /// Error message
        message: String,
    },

    /// Export output could not be produced
    Export {
        /// Output file
        path: PathBuf,
        /// Error message
        message: String,
    },
}

impl IngestError {
    /// Create a new configuration error
    #[must_use]
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new export error
    #[must_use]
    pub fn export<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Export {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(err) => write!(f, "Coverage store error: {err}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Configuration { message } => write!(f, "Configuration error: {message}"),
            Self::Export { path, message } => {
                write!(f, "Export to {} failed: {message}", path.display())
            }
        }
    }
}

impl StdError for IngestError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

// Configuration problems from the core crate keep their own variant
impl From<lora_coverage_core::Error> for IngestError {
    fn from(err: lora_coverage_core::Error) -> Self {
        match err {
            lora_coverage_core::Error::Configuration { message } => Self::Configuration { message },
            lora_coverage_core::Error::Validation { field, message } => Self::Configuration {
                message: format!("{field} - {message}"),
            },
            other => Self::Store(other),
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
